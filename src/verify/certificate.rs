//! Name and keyword extraction from certificate text.
//!
//! Lower trust than the GitHub path. Matching is plain substring containment
//! on normalized text and must stay that weak.

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use super::evidence::CertificateUpload;

const MIN_SKILL_CHARS: usize = 3;
const MAX_COURSE_WORDS: usize = 8;

/// Outcome of analyzing one certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAnalysis {
    /// Declared-name tokens found in the document, space separated.
    pub extracted_name: String,
    pub name_match: bool,
    #[serde(default)]
    pub course_topics: Vec<String>,
    #[serde(default)]
    pub inferred_skills: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

/// Lowercase, replace every non-alphabetic character with a space and
/// collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphabetic() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Apply the certificate heuristic to already-extracted document text.
pub fn analyze_certificate_text<S: AsRef<str>>(
    text: &str,
    profile_name: &str,
    declared_skills: &[S],
) -> CertificateAnalysis {
    let document = normalize_text(text);
    let name = normalize_text(profile_name);
    let name_tokens: Vec<&str> = name.split_whitespace().collect();

    let present: Vec<&str> = name_tokens
        .iter()
        .copied()
        .filter(|token| document.contains(token))
        .collect();
    let name_match = !name_tokens.is_empty() && present.len() == name_tokens.len();

    let inferred_skills: Vec<String> = declared_skills
        .iter()
        .map(AsRef::as_ref)
        .filter(|skill| {
            let normalized = normalize_text(skill);
            normalized.chars().count() >= MIN_SKILL_CHARS && document.contains(&normalized)
        })
        .map(|skill| skill.trim().to_string())
        .collect();

    let reason = if name_match {
        format!(
            "name matched; {} declared skill(s) found in document",
            inferred_skills.len()
        )
    } else if present.is_empty() {
        "profile name not found in document".to_string()
    } else {
        format!(
            "partial name match ({} of {} tokens)",
            present.len(),
            name_tokens.len()
        )
    };

    CertificateAnalysis {
        extracted_name: present.join(" "),
        name_match,
        course_topics: course_topics(&document),
        inferred_skills,
        reason,
    }
}

/// Words following a "course" marker, if any.
fn course_topics(document: &str) -> Vec<String> {
    let words: Vec<&str> = document.split_whitespace().collect();
    let Some(marker) = words.iter().position(|w| *w == "course") else {
        return Vec::new();
    };
    let topic = words[marker + 1..]
        .iter()
        .take(MAX_COURSE_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if topic.is_empty() {
        Vec::new()
    } else {
        vec![topic]
    }
}

// ── Analyzer collaborators ───────────────────────────────────────────────────

/// Text extraction + matching collaborator for one certificate image.
pub trait CertificateAnalyzer: Send + Sync {
    fn analyze<'a>(
        &'a self,
        upload: &'a CertificateUpload,
        profile_name: &'a str,
        declared_skills: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<CertificateAnalysis>> + Send + 'a>>;
}

/// Treats upload bytes as already-extracted UTF-8 text (e.g. the output of an
/// offline OCR pass) and applies the local heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractedTextAnalyzer;

impl CertificateAnalyzer for ExtractedTextAnalyzer {
    fn analyze<'a>(
        &'a self,
        upload: &'a CertificateUpload,
        profile_name: &'a str,
        declared_skills: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<CertificateAnalysis>> + Send + 'a>> {
        Box::pin(async move {
            let text = std::str::from_utf8(&upload.image)
                .with_context(|| format!("{} is not UTF-8 text", upload.file_name))?;
            Ok(analyze_certificate_text(text, profile_name, declared_skills))
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OcrRequest<'a> {
    image_base64: String,
    profile_name: &'a str,
    profile_skills: &'a [String],
}

/// Remote OCR service speaking
/// `{imageBase64, profileName, profileSkills[]}` →
/// `{extractedName, inferredSkills[], nameMatch, reason}`.
pub struct HttpCertificateAnalyzer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCertificateAnalyzer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(anyhow::Error::from)
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl CertificateAnalyzer for HttpCertificateAnalyzer {
    fn analyze<'a>(
        &'a self,
        upload: &'a CertificateUpload,
        profile_name: &'a str,
        declared_skills: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<CertificateAnalysis>> + Send + 'a>> {
        Box::pin(async move {
            let body = OcrRequest {
                image_base64: base64::engine::general_purpose::STANDARD.encode(&upload.image),
                profile_name,
                profile_skills: declared_skills,
            };
            debug!(
                file = upload.file_name.as_str(),
                bytes = upload.image.len(),
                "Submitting certificate for analysis"
            );

            let resp = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("certificate analysis request for {}", upload.file_name))?;

            let status = resp.status();
            anyhow::ensure!(
                status.is_success(),
                "certificate analysis for {} returned {status}",
                upload.file_name
            );

            resp.json::<CertificateAnalysis>()
                .await
                .context("decode certificate analysis response")
        })
    }
}
