//! Research stage prompt templates
//!
//! - Initial query: the broad first search for a target
//! - Analysis: fill the ten-section draft and propose follow-up searches
//! - Synthesis: turn draft plus evidence into a Markdown report
//! - Structuring: flatten the report into the canonical English record

use serde_json::Value;

use crate::llm::OutputSchema;

/// System preamble shared by every research completion
pub const RESEARCH_PREAMBLE: &str = "You are a meticulous scholarship research assistant. \
Base every statement on the supplied web content and never invent deadlines, amounts or requirements.";

/// Identifier field of the structured record
pub const IDENTIFIER_FIELD: &str = "Scholarship_Name";

/// Ten-section draft filled in by the analysis stage
pub const DRAFT_SHAPE: &str = r#"{
  "basic_info": {
    "official_name": "...",
    "provider": "...",
    "study_country": "..."
  },
  "funding_info": {
    "funding_details": "...",
    "covered_expenses": ["..."]
  },
  "timeline_info": {
    "application_deadline": "...",
    "opening_date": "...",
    "number_of_awards": "..."
  },
  "eligibility_criteria": {
    "for_vietnamese": "...",
    "age_requirements": "...",
    "work_requirements": "..."
  },
  "field_restrictions": {
    "eligible_fields": "...",
    "restrictions": "..."
  },
  "academic_requirements": {
    "min_gpa": "...",
    "required_degree": "..."
  },
  "experience_requirements": {
    "min_years": "...",
    "accepted_types": "..."
  },
  "test_requirements": {
    "ielts_toefl": "...",
    "gmat_gre": "..."
  },
  "additional_requirements": {
    "reference_letters": "...",
    "career_plan": "..."
  },
  "background_and_logistics": {
    "official_website": "...",
    "application_documents": "...",
    "selection_process": "..."
  }
}"#;

/// Flat English record produced by the structuring stage
pub const FLAT_RECORD_SHAPE: &str = r#"{
  "Scholarship_Name": "",
  "Scholarship_Type": "",
  "Country": "",
  "Funding_Level": "",
  "Funding_Details": "",
  "Application_Mode": "",
  "Application_Month": "",
  "Start_Date": "",
  "End_Date": "",
  "Quantity": "",
  "For_Vietnamese": false,
  "Eligibility": "",
  "Eligible_Applicants": "",
  "Field_Restriction": false,
  "Eligible_Fields": "",
  "Required_Degree": "",
  "Min_Gpa": 0.0,
  "Bachelor_Field_Relevance": "",
  "Experience_Years": 0.0,
  "Min_Working_Hours": 0,
  "Language_Certificate": "",
  "Academic_Certificate": "",
  "Awards_Requirement": "",
  "Publication_Requirement": "",
  "Age": "",
  "Gender": "",
  "Special_Circumstances": "",
  "Career_Plan": "",
  "Other_Requirements": "",
  "Scholarship_Info": "",
  "Application_Documents": "",
  "Timeline": "",
  "Url": ""
}"#;

const ANALYSIS_TEMPLATE: &str = r#"# Scholarship Analysis

You are an expert scholarship analyst. Below is raw web content collected for the scholarship "{target}".

## Raw Web Content

{context}

## Instructions

1. **Fill the draft**: Using ONLY the content above, fill in as much of this structure as you can. Leave a field as `null` when the content does not state it.

{draft_shape}

2. **Find the gaps**: For every `null` field, write a specific web search query that would find it. Return an empty list when nothing is missing.

3. **Do not repeat failed searches**: These queries already ran and returned nothing new:
{exhausted}
Never propose any of them again. If the topic is still missing, rephrase (for example "English language proficiency test scores" instead of "IELTS requirements").

Put the filled structure under `report_data` and the new queries under `missing_queries`.
"#;

const SYNTHESIS_TEMPLATE: &str = r#"# Scholarship Report

You are a senior research analyst. Write a final, comprehensive analytical report in English on the "{target}" scholarship.

## Draft Report (may contain nulls)

{draft}

## All Collected Evidence

{context}

## Instructions

- Use the draft as a guide for structure and the evidence to fill its gaps with detail.
- Organize the report with Markdown headings such as `## Basic Information`, `## Funding and Benefits` and `## Eligibility Criteria`.
- Synthesize the sources into one coherent narrative instead of listing them.
- Stay strictly within the facts in the inputs.

Respond with ONLY the Markdown report.
"#;

const STRUCTURING_TEMPLATE: &str = r#"# Scholarship Record

You are a data structuring agent. Convert the report below into one flat English JSON record for a search index.

## Report

{report}

## Formatting Rules

- `For_Vietnamese` and `Field_Restriction` are literal booleans.
- `Min_Working_Hours` is an integer; `Min_Gpa` and `Experience_Years` are numbers, `0` when not stated.
- Dates use DD/MM/YYYY, or "" when vague or missing.
- `Language_Certificate` is "<Certificate> <Score>", for example "IELTS 7.0".
- `Timeline` is a chronological list of "<Time> : <Event>" lines.
- `Url` is the official scholarship or application page.

## Allowed Category Values

- `Scholarship_Type`: Government, University, Organization/Foundation
- `Funding_Level` (comma-separated): Full scholarship, Tuition Waiver, Stipend, Accommodation, Partial Funding, Fixed Amount, Other Costs
- `Application_Mode`: Annual, Rolling (`Application_Month` is "1" to "12" for Annual, "" for Rolling)
- `Bachelor_Field_Relevance`: Strictly required, Loosely required, Not mentioned
- `Gender`: Male, Female, No requirement
- `Required_Degree` (comma-separated): Bachelor's degree, Bachelor's equivalent, None, Master's degree, PhD
- `Academic_Certificate` (comma-separated): Not required, GMAT, GRE, or other named certifications
"#;

/// Prompt templates for the research stages
pub struct ResearchPrompts;

impl ResearchPrompts {
    /// Broad first search for a target
    pub fn initial_query(target: &str) -> String {
        format!(
            "{} scholarship official information eligibility funding deadline",
            target
        )
    }

    /// Analysis and planning prompt
    pub fn analysis<'a, I>(target: &str, context: &str, exhausted: I) -> String
    where
        I: IntoIterator<Item = &'a String>,
    {
        let exhausted: Vec<String> = exhausted.into_iter().map(|q| format!("- {}", q)).collect();
        let exhausted = if exhausted.is_empty() {
            "- (none)".to_string()
        } else {
            exhausted.join("\n")
        };

        PromptBuilder::new(ANALYSIS_TEMPLATE)
            .with("draft_shape", DRAFT_SHAPE)
            .with("exhausted", exhausted)
            .with("target", target)
            .with("context", context)
            .build()
    }

    /// Synthesis prompt over the draft and every piece of evidence
    pub fn synthesis(target: &str, draft: &Value, context: &str) -> String {
        let draft = serde_json::to_string_pretty(draft).unwrap_or_else(|_| draft.to_string());

        PromptBuilder::new(SYNTHESIS_TEMPLATE)
            .with("draft", draft)
            .with("target", target)
            .with("context", context)
            .build()
    }

    /// Structuring prompt over the synthesized report
    pub fn structuring(report: &str) -> String {
        PromptBuilder::new(STRUCTURING_TEMPLATE).with("report", report).build()
    }

    /// Output schema of the analysis stage
    pub fn analysis_schema() -> OutputSchema {
        OutputSchema::new(
            "analysis",
            r#"{"report_data": { ... }, "missing_queries": ["search query", "..."]}"#,
        )
        .with_required(["report_data", "missing_queries"])
    }

    /// Output schema of the structuring stage
    pub fn structured_schema() -> OutputSchema {
        OutputSchema::new("structured_record", FLAT_RECORD_SHAPE)
    }
}

/// Prompt builder for dynamic template substitution
pub struct PromptBuilder {
    template: String,
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute a placeholder with a value
    ///
    /// Placeholders are formatted as `{name}`. Substitution is sequential,
    /// so free text (web content) goes in last.
    pub fn with(mut self, name: &str, value: impl AsRef<str>) -> Self {
        let placeholder = format!("{{{}}}", name);
        self.template = self.template.replace(&placeholder, value.as_ref());
        self
    }

    pub fn build(self) -> String {
        self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initial_query() {
        assert_eq!(
            ResearchPrompts::initial_query("Chevening Scholarship"),
            "Chevening Scholarship scholarship official information eligibility funding deadline"
        );
    }

    #[test]
    fn test_analysis_prompt_lists_exhausted_queries() {
        let exhausted = vec!["Chevening deadline 2026".to_string()];
        let prompt = ResearchPrompts::analysis("Chevening", "URL: a\nCONTENT: b", &exhausted);

        assert!(prompt.contains("\"Chevening\""));
        assert!(prompt.contains("- Chevening deadline 2026"));
        assert!(prompt.contains("URL: a\nCONTENT: b"));
        assert!(prompt.contains("\"background_and_logistics\""));
    }

    #[test]
    fn test_analysis_prompt_without_exhausted_queries() {
        let prompt = ResearchPrompts::analysis("Fulbright", "", &Vec::<String>::new());
        assert!(prompt.contains("- (none)"));
    }

    #[test]
    fn test_context_placeholders_are_not_expanded() {
        let prompt = ResearchPrompts::analysis("X", "page mentions {exhausted} literally", &Vec::<String>::new());
        assert!(prompt.contains("page mentions {exhausted} literally"));
    }

    #[test]
    fn test_synthesis_prompt_embeds_draft() {
        let draft = json!({"basic_info": {"provider": "UK Government"}});
        let prompt = ResearchPrompts::synthesis("Chevening", &draft, "evidence");

        assert!(prompt.contains("UK Government"));
        assert!(prompt.contains("evidence"));
        assert!(prompt.contains("Markdown"));
    }

    #[test]
    fn test_synthesis_prompt_names_report_headings() {
        let prompt = ResearchPrompts::synthesis("Chevening", &json!({}), "");

        assert!(prompt.contains("\"Chevening\" scholarship"));
        assert!(prompt.contains("`## Basic Information`"));
        assert!(prompt.contains("`## Eligibility Criteria`"));
        assert!(prompt.trim_end().ends_with("Respond with ONLY the Markdown report."));
    }

    #[test]
    fn test_structuring_prompt() {
        let prompt = ResearchPrompts::structuring("## Basic Information");
        assert!(prompt.contains("## Basic Information"));
        assert!(prompt.contains("Organization/Foundation"));
    }

    #[test]
    fn test_schemas() {
        let analysis = ResearchPrompts::analysis_schema();
        assert_eq!(analysis.required, vec!["report_data", "missing_queries"]);

        let structured = ResearchPrompts::structured_schema();
        assert!(structured.shape.contains(IDENTIFIER_FIELD));
        assert!(structured.required.is_empty());
    }

    #[test]
    fn test_prompt_builder() {
        let prompt = PromptBuilder::new("{x} + {x} = {result}")
            .with("x", "2")
            .with("result", "4")
            .build();

        assert_eq!(prompt, "2 + 2 = 4");
    }
}
