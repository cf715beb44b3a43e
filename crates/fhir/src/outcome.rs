//! FHIR OperationOutcome reading, used to explain rejected writes.

use serde::Deserialize;

/// OperationOutcome operations.
pub struct OperationOutcome;

impl OperationOutcome {
    /// Summarises the issues of an OperationOutcome body into one line.
    ///
    /// Returns `None` if the body is not an OperationOutcome or carries no readable issue.
    /// This never fails: it is used on error paths where the body is advisory only.
    pub fn summary(json_text: &str) -> Option<String> {
        let wire: OperationOutcomeWire = serde_json::from_str(json_text).ok()?;
        if wire.resource_type != "OperationOutcome" {
            return None;
        }

        let messages: Vec<String> = wire
            .issue
            .into_iter()
            .filter_map(|issue| {
                let text = issue
                    .diagnostics
                    .or_else(|| issue.details.and_then(|d| d.text))?;
                Some(match issue.severity {
                    Some(severity) => format!("{severity}: {text}"),
                    None => text,
                })
            })
            .collect();

        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

#[derive(Deserialize)]
struct OperationOutcomeWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    #[serde(default)]
    issue: Vec<IssueWire>,
}

#[derive(Deserialize)]
struct IssueWire {
    #[serde(default)]
    severity: Option<String>,

    #[serde(default)]
    diagnostics: Option<String>,

    #[serde(default)]
    details: Option<DetailsWire>,
}

#[derive(Deserialize)]
struct DetailsWire {
    #[serde(default)]
    text: Option<String>,
}
