//! Shape-only specs for the domain tools.
//!
//! The core defines each tool's name, description, and parameter schema;
//! the execution detail (scrapers, parsers, HTTP calls) belongs to the
//! embedding application, which binds a handler to each spec:
//!
//! ```rust
//! use caravel::caravel::tool_protocol::{FnTool, ToolResult};
//! use caravel::caravel::tools::specs;
//!
//! let search = FnTool::new(specs::search_jobs(), |args| async move {
//!     let _keywords = args.get("keywords").cloned();
//!     Ok(ToolResult::success(serde_json::json!({"jobs": [], "count": 0})))
//! });
//! ```
//!
//! [`default_toolbox_specs`] lists which specs each agent expects, matching
//! the pipeline's agent factories.

use crate::caravel::agent::AgentName;
use crate::caravel::tool_protocol::ToolSpec;
use serde_json::json;

fn string_prop(description: &str) -> serde_json::Value {
    json!({"type": "string", "description": description})
}

pub fn search_jobs() -> ToolSpec {
    ToolSpec::new(
        "search_jobs",
        "Search job boards for openings matching keywords. Returns job listings with title, company, location, and URL.",
        json!({
            "type": "object",
            "properties": {
                "keywords": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Skills or role keywords to search for",
                },
                "location": string_prop("Optional location filter, e.g. 'remote' or a city"),
                "limit": {"type": "integer", "description": "Maximum results to return"},
            },
            "required": ["keywords"],
        }),
    )
}

pub fn parse_job_description() -> ToolSpec {
    ToolSpec::new(
        "parse_job_description",
        "Parse a job description into structured requirements: required skills, preferred skills, responsibilities, and keywords.",
        json!({
            "type": "object",
            "properties": {
                "jd_text": string_prop("The raw job description text"),
            },
            "required": ["jd_text"],
        }),
    )
}

pub fn analyze_resume() -> ToolSpec {
    ToolSpec::new(
        "analyze_resume",
        "Extract skills, experience, and education from a resume.",
        json!({
            "type": "object",
            "properties": {
                "resume_text": string_prop("The raw resume text"),
            },
            "required": ["resume_text"],
        }),
    )
}

pub fn match_skills() -> ToolSpec {
    ToolSpec::new(
        "match_skills",
        "Compare candidate skills against job requirements, returning overlaps and gaps.",
        json!({
            "type": "object",
            "properties": {
                "candidate_skills": {"type": "array", "items": {"type": "string"}},
                "required_skills": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["candidate_skills", "required_skills"],
        }),
    )
}

pub fn score_ats() -> ToolSpec {
    ToolSpec::new(
        "score_ats",
        "Score a resume against ATS criteria for a job description, returning a 0-100 score with improvement suggestions.",
        json!({
            "type": "object",
            "properties": {
                "resume_text": string_prop("The resume text"),
                "jd_text": string_prop("The job description text"),
            },
            "required": ["resume_text", "jd_text"],
        }),
    )
}

pub fn prepare_interview() -> ToolSpec {
    ToolSpec::new(
        "prepare_interview",
        "Generate likely interview questions with talking points for a role at a company.",
        json!({
            "type": "object",
            "properties": {
                "role": string_prop("The role being interviewed for"),
                "company": string_prop("The company name"),
                "focus_areas": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["role"],
        }),
    )
}

pub fn generate_cover_letter() -> ToolSpec {
    ToolSpec::new(
        "generate_cover_letter",
        "Write a tailored cover letter from a resume and job description.",
        json!({
            "type": "object",
            "properties": {
                "resume_text": string_prop("The candidate's resume text"),
                "jd_text": string_prop("The job description text"),
                "tone": string_prop("Optional tone, e.g. 'formal' or 'conversational'"),
            },
            "required": ["resume_text", "jd_text"],
        }),
    )
}

pub fn rewrite_resume() -> ToolSpec {
    ToolSpec::new(
        "rewrite_resume",
        "Rewrite resume bullets to mirror a job description's language without fabricating experience.",
        json!({
            "type": "object",
            "properties": {
                "resume_text": string_prop("The resume text to rewrite"),
                "jd_text": string_prop("The target job description"),
            },
            "required": ["resume_text", "jd_text"],
        }),
    )
}

pub fn research_company() -> ToolSpec {
    ToolSpec::new(
        "research_company",
        "Research a company: size, funding, culture signals, and recent news.",
        json!({
            "type": "object",
            "properties": {
                "company": string_prop("Company name to research"),
            },
            "required": ["company"],
        }),
    )
}

pub fn analyze_github() -> ToolSpec {
    ToolSpec::new(
        "analyze_github",
        "Analyze a GitHub profile for languages, activity, and notable projects.",
        json!({
            "type": "object",
            "properties": {
                "username": string_prop("GitHub username or profile URL"),
            },
            "required": ["username"],
        }),
    )
}

pub fn research_salary() -> ToolSpec {
    ToolSpec::new(
        "research_salary",
        "Research salary ranges for a role, seniority, and location.",
        json!({
            "type": "object",
            "properties": {
                "role": string_prop("The role title"),
                "location": string_prop("Location or 'remote'"),
                "experience_level": string_prop("Seniority, e.g. 'senior'"),
            },
            "required": ["role"],
        }),
    )
}

pub fn draft_email() -> ToolSpec {
    ToolSpec::new(
        "draft_email",
        "Draft a professional email: outreach, follow-up, thank-you, or negotiation.",
        json!({
            "type": "object",
            "properties": {
                "purpose": string_prop("What the email is for"),
                "recipient": string_prop("Who it is addressed to"),
                "context": string_prop("Relevant background to include"),
            },
            "required": ["purpose"],
        }),
    )
}

pub fn generate_learning_path() -> ToolSpec {
    ToolSpec::new(
        "generate_learning_path",
        "Build a learning path to close skill gaps for a target role.",
        json!({
            "type": "object",
            "properties": {
                "target_role": string_prop("The role to prepare for"),
                "missing_skills": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["target_role"],
        }),
    )
}

pub fn mock_interview() -> ToolSpec {
    ToolSpec::new(
        "mock_interview",
        "Run a mock interview exchange: ask a question or grade an answer.",
        json!({
            "type": "object",
            "properties": {
                "role": string_prop("The role being practiced for"),
                "answer": string_prop("Optional candidate answer to grade"),
            },
            "required": ["role"],
        }),
    )
}

pub fn fetch_url() -> ToolSpec {
    ToolSpec::new(
        "fetch_url",
        "Fetch a web page and return its readable text content.",
        json!({
            "type": "object",
            "properties": {
                "url": string_prop("The URL to fetch"),
            },
            "required": ["url"],
        }),
    )
}

/// Every domain tool spec, in the order the chat registry presents them.
pub fn all() -> Vec<ToolSpec> {
    vec![
        search_jobs(),
        parse_job_description(),
        analyze_resume(),
        match_skills(),
        score_ats(),
        prepare_interview(),
        generate_cover_letter(),
        rewrite_resume(),
        research_company(),
        analyze_github(),
        research_salary(),
        draft_email(),
        generate_learning_path(),
        mock_interview(),
        fetch_url(),
    ]
}

/// The domain tool subset each agent expects its toolbox to bind.
pub fn default_toolbox_specs(name: AgentName) -> Vec<ToolSpec> {
    match name {
        AgentName::Scout => vec![search_jobs(), research_company()],
        AgentName::Match => vec![
            parse_job_description(),
            analyze_resume(),
            match_skills(),
            score_ats(),
        ],
        AgentName::Forge => vec![generate_cover_letter(), rewrite_resume()],
        AgentName::Coach => vec![prepare_interview()],
    }
}
