use crate::verify::VerificationRecord;

fn join_or_dash<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    let joined = items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() { "-".into() } else { joined }
}

pub fn render_record(record: &VerificationRecord) -> String {
    let mut lines = vec![
        format!("◆ Verification {}", record.id),
        String::new(),
        format!("   Status          {}", record.status),
        format!("   Trust           {}", record.trust_level()),
        format!(
            "   Verified at     {}",
            record.verified_at.format("%Y-%m-%d %H:%M UTC")
        ),
        format!("   Verified skills {}", join_or_dash(&record.verified_skills)),
        format!(
            "   Declared        {}",
            join_or_dash(&record.profile_skills_at_verification)
        ),
    ];

    if let (Some(metrics), Some(score)) = (record.metrics, record.overall_score) {
        lines.push(format!(
            "   Score           {score}/100 (activity {}, consistency {}, recency {}, diversity {})",
            metrics.activity, metrics.consistency, metrics.recency, metrics.diversity
        ));
    }

    if let Some(github) = &record.sources.github {
        lines.push(format!(
            "   GitHub          {} (oauth verified: {})",
            github.username, github.oauth_verified
        ));
    }

    if let Some(certificates) = &record.sources.certificates {
        for cert in certificates {
            lines.push(format!(
                "   Certificate     {} name match: {} skills: {}",
                cert.file_name,
                cert.name_match,
                join_or_dash(&cert.inferred_skills)
            ));
        }
    }

    if let (Some(at), Some(reason)) = (record.invalidated_at, record.invalidation_reason) {
        lines.push(format!(
            "   Invalidated     {} ({reason})",
            at.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    lines.join("\n")
}

/// One line per record, newest first.
pub fn render_history(records: &[VerificationRecord]) -> String {
    if records.is_empty() {
        return "No verification records.".into();
    }
    records
        .iter()
        .map(|r| {
            let reason = r
                .invalidation_reason
                .map(|reason| format!(" ({reason})"))
                .unwrap_or_default();
            format!(
                "{}  {:<11}{reason}  {}  [{}]",
                r.verified_at.format("%Y-%m-%d"),
                r.status.to_string(),
                r.id,
                join_or_dash(&r.verified_skills)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
