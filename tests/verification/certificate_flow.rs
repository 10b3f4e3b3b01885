use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::verification_harness::{USER_ID, declared, harness, harness_with};
use teamup::VerificationError;
use teamup::config::VerificationConfig;
use teamup::verify::{
    CertificateEvidence, CertificateUpload, EvidenceSource, HttpCertificateAnalyzer, TrustLevel,
};

fn upload(file_name: &str, text: &str) -> CertificateUpload {
    CertificateUpload {
        file_name: file_name.into(),
        image: text.as_bytes().to_vec(),
    }
}

fn certificates(name: &str, uploads: Vec<CertificateUpload>) -> EvidenceSource {
    EvidenceSource::Certificates(CertificateEvidence {
        profile_name: name.into(),
        uploads,
    })
}

#[tokio::test]
async fn matching_certificate_verifies_named_course_skill() {
    let server = MockServer::start().await;
    let h = harness(&server).await;

    let record = h
        .manager
        .verify(
            USER_ID,
            &certificates(
                "John Smith",
                vec![upload("react.png", "JOHN A SMITH \u{2014} Course: React Fundamentals")],
            ),
            &declared(&["React", "Figma"]),
        )
        .await
        .expect("verify");

    assert!(record.verified_skills.contains("React"));
    assert!(!record.verified_skills.contains("Figma"));
    assert!(record.metrics.is_none());
    assert!(!record.is_github_sourced());
    assert_eq!(record.trust_level(), TrustLevel::Low);

    let certs = record.sources.certificates.as_ref().expect("certificate source");
    assert!(certs[0].name_match);
    assert!(certs[0].course_topics.iter().any(|t| t.contains("react")));
}

#[tokio::test]
async fn certificate_for_someone_else_contributes_nothing() {
    let server = MockServer::start().await;
    let h = harness(&server).await;

    let record = h
        .manager
        .verify(
            USER_ID,
            &certificates(
                "John Smith",
                vec![upload("figma.png", "Awarded to Jane Doe for Figma Mastery")],
            ),
            &declared(&["Figma"]),
        )
        .await
        .expect("persisted with no verified skills");

    assert!(record.verified_skills.is_empty());
    assert_eq!(record.trust_level(), TrustLevel::Minimal);
}

#[tokio::test]
async fn reject_policy_refuses_unmatched_certificates() {
    let server = MockServer::start().await;
    let config = VerificationConfig {
        no_evidence: teamup::config::NoEvidencePolicy::Reject,
        ..VerificationConfig::default()
    };
    let h = harness_with(
        &server,
        Arc::new(teamup::verify::ExtractedTextAnalyzer),
        config,
    )
    .await;

    let err = h
        .manager
        .verify(
            USER_ID,
            &certificates("John Smith", vec![upload("x.png", "Jane Doe")]),
            &declared(&["Figma"]),
        )
        .await
        .expect_err("no name match");
    assert!(matches!(err, VerificationError::NoEvidence(_)));
    assert!(h.manager.history(USER_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn remote_analyzer_result_drives_the_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_partial_json(json!({
            "profileName": "John Smith",
            "profileSkills": ["React", "Figma"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "extractedName": "john smith",
            "inferredSkills": ["Figma"],
            "nameMatch": true,
            "reason": "name and skill found",
        })))
        .mount(&server)
        .await;

    let analyzer = HttpCertificateAnalyzer::new(
        format!("{}/analyze", server.uri()),
        Duration::from_secs(5),
    )
    .expect("analyzer");
    let h = harness_with(&server, Arc::new(analyzer), VerificationConfig::default()).await;

    let record = h
        .manager
        .verify(
            USER_ID,
            &certificates("John Smith", vec![upload("cert.png", "binary")]),
            &declared(&["React", "Figma"]),
        )
        .await
        .expect("verify");

    assert_eq!(record.verified_skills.len(), 1);
    assert!(record.verified_skills.contains("Figma"));
}

#[tokio::test]
async fn analyzer_outage_fails_without_persisting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let analyzer = HttpCertificateAnalyzer::new(
        format!("{}/analyze", server.uri()),
        Duration::from_secs(5),
    )
    .expect("analyzer");
    let h = harness_with(&server, Arc::new(analyzer), VerificationConfig::default()).await;

    let err = h
        .manager
        .verify(
            USER_ID,
            &certificates("John Smith", vec![upload("cert.png", "binary")]),
            &declared(&["React"]),
        )
        .await
        .expect_err("outage");
    assert!(err.is_retryable());
    assert!(h.manager.history(USER_ID).await.unwrap().is_empty());
}
