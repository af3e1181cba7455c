//! Event description text shown to the user in their calendar.

use shared_types::PolicyDetail;

pub const EVENT_SUMMARY: &str = "Scheduled maintenance";
pub const BODY_STATIC_HEADER: &str = "reserved this time to make some changes to your work computer";
pub const DEFAULT_ORG_NAME: &str = "Your IT team";
pub const DEFAULT_DESCRIPTION: &str =
    "needs to make sure your device meets the organization's requirements.";
pub const DEFAULT_RESOLUTION: &str = "During this maintenance window, you can expect updates to be applied automatically. Your device may be unavailable during this time.";

/// Build the event body for one host.
///
/// Each entry of `policies` is the detail of one failing policy, or `None`
/// when the lookup failed. Unresolved or blank fields fall back to the
/// default description and resolution so no failing policy is dropped.
pub fn event_body(org_name: &str, host_display_name: &str, policies: &[Option<PolicyDetail>]) -> String {
    let org = match org_name.trim() {
        "" => DEFAULT_ORG_NAME,
        name => name,
    };

    let mut body = format!(
        "{} {} ({}).\n\nPlease leave your device on and connected to power.\n",
        org,
        BODY_STATIC_HEADER,
        host_display_name.trim()
    );

    let sections: Vec<(&str, &str)> = if policies.is_empty() {
        vec![(DEFAULT_DESCRIPTION, DEFAULT_RESOLUTION)]
    } else {
        policies
            .iter()
            .map(|detail| {
                let description = detail
                    .as_ref()
                    .and_then(PolicyDetail::description_text)
                    .unwrap_or(DEFAULT_DESCRIPTION);
                let resolution = detail
                    .as_ref()
                    .and_then(PolicyDetail::resolution_text)
                    .unwrap_or(DEFAULT_RESOLUTION);
                (description, resolution)
            })
            .collect()
    };

    for (description, resolution) in sections {
        body.push_str(&format!(
            "\nWhy it matters\n{}\n\nWhat we'll do\n{}\n",
            description, resolution
        ));
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn detail(description: &str, resolution: Option<&str>) -> Option<PolicyDetail> {
        Some(PolicyDetail {
            id: Uuid::new_v4(),
            description: description.to_string(),
            resolution: resolution.map(str::to_string),
        })
    }

    #[test]
    fn test_header_names_org_and_host() {
        let body = event_body(
            "Test Organization",
            "Host 1",
            &[detail("Description for policy 1", Some("Resolution for policy 1"))],
        );
        assert!(body.starts_with(&format!(
            "Test Organization {} (Host 1).",
            BODY_STATIC_HEADER
        )));
        assert!(body.contains("Description for policy 1"));
        assert!(body.contains("Resolution for policy 1"));
        assert!(!body.contains(DEFAULT_RESOLUTION));
    }

    #[test]
    fn test_blank_and_missing_resolution_use_default() {
        for resolution in [Some(""), Some("   "), None] {
            let body = event_body("Org", "Host 2", &[detail("Description for policy 2", resolution)]);
            assert!(body.contains("Description for policy 2"));
            assert!(body.contains(DEFAULT_RESOLUTION));
        }
    }

    #[test]
    fn test_blank_description_uses_default() {
        let body = event_body("Org", "Host 4", &[detail("", Some("Resolution for policy 4"))]);
        assert!(body.contains(DEFAULT_DESCRIPTION));
        assert!(body.contains("Resolution for policy 4"));
    }

    #[test]
    fn test_failed_lookup_still_produces_body() {
        let body = event_body("Org", "Host 7", &[None]);
        assert!(!body.is_empty());
        assert!(body.contains(DEFAULT_DESCRIPTION));
        assert!(body.contains(DEFAULT_RESOLUTION));
    }

    #[test]
    fn test_every_policy_listed_in_order() {
        let body = event_body(
            "Org",
            "Host 5",
            &[
                detail("First", Some("Fix first")),
                None,
                detail("Third", None),
            ],
        );
        let first = body.find("First").unwrap();
        let third = body.find("Third").unwrap();
        assert!(first < third);
        assert!(body.contains("Fix first"));
        assert_eq!(body.matches("Why it matters").count(), 3);
    }

    #[test]
    fn test_blank_org_name() {
        let body = event_body("  ", "Host", &[]);
        assert!(body.starts_with(DEFAULT_ORG_NAME));
        assert!(body.contains(DEFAULT_RESOLUTION));
    }
}
