//! Resume loading and formatting.
//!
//! The resume lives in a JSON document and is rendered once at startup into
//! the text block embedded in the system prompt. Optional sections are
//! skipped when absent.

use crate::context::tokens::TokenCounter;
use crate::prompts::build_system_prompt;
use serde::Deserialize;
use std::fmt::Write;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Failures while loading the resume document.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("resume file not found: {0}")]
    NotFound(String),

    #[error("failed to read resume file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON in resume file: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// Resume Document Model
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Resume {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub skills: Option<Skills>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub certifications: Vec<Certification>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Experience {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Skills {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub databases: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub other: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Education {
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub graduation_date: Option<String>,
    #[serde(default)]
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Certification {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

// ============================================================================
// Loading and Formatting
// ============================================================================

impl Resume {
    /// Load and parse the resume JSON file.
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        if !path.exists() {
            return Err(ResumeError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Render the resume as the text block used in the system prompt.
    pub fn format_as_text(&self) -> String {
        let mut out = String::new();
        let na = "N/A";

        let _ = writeln!(out, "# {}", self.name.as_deref().unwrap_or(na));
        let _ = writeln!(out, "## {}", self.title.as_deref().unwrap_or(na));
        out.push('\n');

        if let Some(contact) = &self.contact {
            out.push_str("### Contact Information\n");
            let _ = writeln!(out, "- Email: {}", contact.email.as_deref().unwrap_or(na));
            let _ = writeln!(out, "- Phone: {}", contact.phone.as_deref().unwrap_or(na));
            let _ = writeln!(
                out,
                "- Location: {}",
                contact.location.as_deref().unwrap_or(na)
            );
            if let Some(linkedin) = &contact.linkedin {
                let _ = writeln!(out, "- LinkedIn: {linkedin}");
            }
            if let Some(github) = &contact.github {
                let _ = writeln!(out, "- GitHub: {github}");
            }
            out.push('\n');
        }

        if let Some(summary) = &self.summary {
            out.push_str("### Professional Summary\n");
            let _ = writeln!(out, "{summary}");
            out.push('\n');
        }

        if !self.experience.is_empty() {
            out.push_str("### Work Experience\n");
            for exp in &self.experience {
                let end = if exp.current {
                    "Present"
                } else {
                    exp.end_date.as_deref().unwrap_or(na)
                };
                let _ = writeln!(
                    out,
                    "#### {} at {}",
                    exp.title.as_deref().unwrap_or(na),
                    exp.company.as_deref().unwrap_or(na)
                );
                let _ = writeln!(
                    out,
                    "{} | {} - {}",
                    exp.location.as_deref().unwrap_or(na),
                    exp.start_date.as_deref().unwrap_or(na),
                    end
                );
                for item in &exp.responsibilities {
                    let _ = writeln!(out, "- {item}");
                }
                out.push('\n');
            }
        }

        if let Some(skills) = &self.skills {
            out.push_str("### Skills\n");
            let groups = [
                ("Languages", &skills.languages),
                ("Frameworks", &skills.frameworks),
                ("Databases", &skills.databases),
                ("Tools", &skills.tools),
                ("Other", &skills.other),
            ];
            for (label, items) in groups {
                if !items.is_empty() {
                    let _ = writeln!(out, "- **{label}**: {}", items.join(", "));
                }
            }
            out.push('\n');
        }

        if !self.education.is_empty() {
            out.push_str("### Education\n");
            for edu in &self.education {
                let _ = writeln!(out, "#### {}", edu.degree.as_deref().unwrap_or(na));
                let _ = writeln!(
                    out,
                    "{}, {}",
                    edu.institution.as_deref().unwrap_or(na),
                    edu.location.as_deref().unwrap_or(na)
                );
                let _ = writeln!(
                    out,
                    "Graduated: {}",
                    edu.graduation_date.as_deref().unwrap_or(na)
                );
                if let Some(gpa) = &edu.gpa {
                    let _ = writeln!(out, "GPA: {gpa}");
                }
                out.push('\n');
            }
        }

        if !self.projects.is_empty() {
            out.push_str("### Notable Projects\n");
            for proj in &self.projects {
                let _ = writeln!(out, "#### {}", proj.name.as_deref().unwrap_or(na));
                let _ = writeln!(out, "{}", proj.description.as_deref().unwrap_or(na));
                if !proj.technologies.is_empty() {
                    let _ = writeln!(out, "Technologies: {}", proj.technologies.join(", "));
                }
                if let Some(url) = &proj.url {
                    let _ = writeln!(out, "URL: {url}");
                }
                out.push('\n');
            }
        }

        if !self.certifications.is_empty() {
            out.push_str("### Certifications\n");
            for cert in &self.certifications {
                let _ = writeln!(
                    out,
                    "- {} - {} ({})",
                    cert.name.as_deref().unwrap_or(na),
                    cert.issuer.as_deref().unwrap_or(na),
                    cert.date.as_deref().unwrap_or(na)
                );
            }
            out.push('\n');
        }

        out.trim_end().to_string()
    }
}

/// Resume data prepared for chat processing, computed once at startup.
pub struct ResumeContext {
    /// Full system prompt with the resume text embedded
    pub system_prompt: String,
    /// Token cost of the system prompt
    pub system_prompt_tokens: usize,
}

impl ResumeContext {
    /// Load the resume, build the system prompt and count its tokens.
    pub fn from_file(path: &Path, counter: &TokenCounter) -> Result<Self, ResumeError> {
        let resume = Resume::load(path)?;
        let system_prompt = build_system_prompt(&resume.format_as_text());
        let system_prompt_tokens = counter.count_tokens(&system_prompt);

        info!(
            path = %path.display(),
            system_prompt_tokens,
            "Resume loaded"
        );

        Ok(Self {
            system_prompt,
            system_prompt_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as IoWrite;

    fn sample_json() -> &'static str {
        r#"{
            "name": "Jane Doe",
            "title": "Senior Backend Engineer",
            "contact": {
                "email": "jane@example.com",
                "location": "Berlin, Germany",
                "github": "https://github.com/janedoe"
            },
            "summary": "Backend engineer with a focus on reliable network services.",
            "experience": [{
                "title": "Senior Engineer",
                "company": "Acme",
                "location": "Berlin",
                "start_date": "2021-03",
                "current": true,
                "responsibilities": ["Built the billing pipeline", "Led on-call rotation"]
            }],
            "skills": {
                "languages": ["Rust", "Python"],
                "databases": ["PostgreSQL", "SQLite"]
            },
            "education": [{
                "degree": "BSc Computer Science",
                "institution": "TU Berlin",
                "location": "Berlin",
                "graduation_date": "2016"
            }]
        }"#
    }

    fn sample_resume() -> Resume {
        serde_json::from_str(sample_json()).unwrap()
    }

    #[test]
    fn test_format_includes_all_present_sections() {
        let text = sample_resume().format_as_text();
        assert!(text.starts_with("# Jane Doe"));
        assert!(text.contains("## Senior Backend Engineer"));
        assert!(text.contains("- Email: jane@example.com"));
        assert!(text.contains("- GitHub: https://github.com/janedoe"));
        assert!(text.contains("### Professional Summary"));
        assert!(text.contains("#### Senior Engineer at Acme"));
        assert!(text.contains("Berlin | 2021-03 - Present"));
        assert!(text.contains("- Built the billing pipeline"));
        assert!(text.contains("- **Languages**: Rust, Python"));
        assert!(text.contains("Graduated: 2016"));
    }

    #[test]
    fn test_format_skips_absent_sections() {
        let text = sample_resume().format_as_text();
        assert!(!text.contains("### Notable Projects"));
        assert!(!text.contains("### Certifications"));
        assert!(!text.contains("- Phone: jane"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Resume::load(Path::new("/nonexistent/resume.json")).unwrap_err();
        assert!(matches!(err, ResumeError::NotFound(_)));
    }

    #[test]
    fn test_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = Resume::load(file.path()).unwrap_err();
        assert!(matches!(err, ResumeError::Parse(_)));
    }

    #[test]
    fn test_resume_context_counts_system_prompt() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample_json()).unwrap();

        let counter = TokenCounter::new().unwrap();
        let ctx = ResumeContext::from_file(file.path(), &counter).unwrap();

        assert!(ctx.system_prompt.contains("Jane Doe"));
        assert_eq!(
            ctx.system_prompt_tokens,
            counter.count_tokens(&ctx.system_prompt)
        );
        assert!(ctx.system_prompt_tokens > 0);
    }
}
