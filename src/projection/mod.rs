use std::time::Duration;

use crate::enhance::{EnhancementSnapshot, EnhancementStatus};

/// Everything the status line depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectionInput<'a> {
    pub status: EnhancementStatus,
    pub has_identity: bool,
    pub has_image: bool,
    pub has_prompt: bool,
    pub attempt: u32,
    pub max_attempts: u32,
    pub retry_delay: Option<Duration>,
    pub message: Option<&'a str>,
    pub persistence_warning: Option<&'a str>,
}

impl<'a> ProjectionInput<'a> {
    pub fn from_snapshot(snapshot: &'a EnhancementSnapshot) -> Self {
        Self {
            status: snapshot.status,
            attempt: snapshot.attempt,
            max_attempts: snapshot.max_attempts,
            retry_delay: snapshot.retry_delay,
            message: snapshot.message.as_deref(),
            persistence_warning: snapshot.persistence_warning.as_deref(),
            ..Self::default()
        }
    }

    pub fn with_presence(self, has_identity: bool, has_image: bool, has_prompt: bool) -> Self {
        Self {
            has_identity,
            has_image,
            has_prompt,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    pub can_submit: bool,
    pub status_text: String,
    pub show_spinner: bool,
}

pub fn project(input: &ProjectionInput<'_>) -> UiState {
    let in_flight = input.status.is_in_flight();
    UiState {
        can_submit: !in_flight && input.has_identity && input.has_image && input.has_prompt,
        status_text: status_text(input),
        show_spinner: in_flight,
    }
}

fn status_text(input: &ProjectionInput<'_>) -> String {
    match input.status {
        EnhancementStatus::Persisting => "Saving your vibe...".to_string(),
        EnhancementStatus::Invoking if input.attempt > 1 => format!(
            "Enhancing photo (attempt {} of {})...",
            input.attempt, input.max_attempts
        ),
        EnhancementStatus::Invoking => "Enhancing photo...".to_string(),
        EnhancementStatus::RetryPending => {
            let delay = input.retry_delay.unwrap_or_default();
            format!(
                "Attempt {} failed. Retrying in {}...",
                input.attempt,
                format_delay(delay)
            )
        }
        EnhancementStatus::Succeeded => with_warning(
            input.message.unwrap_or("Photo enhanced successfully!"),
            input.persistence_warning,
        ),
        EnhancementStatus::Failed => with_warning(
            input.message.unwrap_or_else(|| guidance(input)),
            input.persistence_warning,
        ),
        EnhancementStatus::Idle => input
            .message
            .map(str::to_string)
            .unwrap_or_else(|| guidance(input).to_string()),
    }
}

fn with_warning(base: &str, warning: Option<&str>) -> String {
    match warning {
        Some(warning) => format!("{base} {warning}"),
        None => base.to_string(),
    }
}

fn guidance(input: &ProjectionInput<'_>) -> &'static str {
    if !input.has_identity {
        "Sign in to get started."
    } else if !input.has_image {
        "Upload a photo to enhance."
    } else if !input.has_prompt {
        "Describe the vibe you want."
    } else {
        "Ready to enhance."
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        format!("{}s", delay.as_secs())
    } else {
        format!("{:.1}s", delay.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> ProjectionInput<'static> {
        ProjectionInput {
            max_attempts: 4,
            ..ProjectionInput::default()
        }
        .with_presence(true, true, true)
    }

    #[test]
    fn submit_needs_identity_image_and_prompt() {
        assert!(project(&ready()).can_submit);
        for (identity, image, prompt) in [(false, true, true), (true, false, true), (true, true, false)]
        {
            let input = ready().with_presence(identity, image, prompt);
            assert!(!project(&input).can_submit);
        }
    }

    #[test]
    fn in_flight_states_disable_submit_and_show_spinner() {
        for status in [
            EnhancementStatus::Persisting,
            EnhancementStatus::Invoking,
            EnhancementStatus::RetryPending,
        ] {
            let state = project(&ProjectionInput {
                status,
                attempt: 1,
                retry_delay: Some(Duration::from_secs(1)),
                ..ready()
            });
            assert!(!state.can_submit);
            assert!(state.show_spinner);
        }
    }

    #[test]
    fn resting_states_allow_resubmission() {
        for status in [EnhancementStatus::Succeeded, EnhancementStatus::Failed] {
            let state = project(&ProjectionInput { status, ..ready() });
            assert!(state.can_submit);
            assert!(!state.show_spinner);
        }
    }

    #[test]
    fn in_flight_text_reports_attempts_and_delay() {
        let persisting = project(&ProjectionInput {
            status: EnhancementStatus::Persisting,
            ..ready()
        });
        assert_eq!(persisting.status_text, "Saving your vibe...");

        let first = project(&ProjectionInput {
            status: EnhancementStatus::Invoking,
            attempt: 1,
            ..ready()
        });
        assert_eq!(first.status_text, "Enhancing photo...");

        let second = project(&ProjectionInput {
            status: EnhancementStatus::Invoking,
            attempt: 2,
            ..ready()
        });
        assert_eq!(second.status_text, "Enhancing photo (attempt 2 of 4)...");

        let waiting = project(&ProjectionInput {
            status: EnhancementStatus::RetryPending,
            attempt: 1,
            retry_delay: Some(Duration::from_millis(1000)),
            ..ready()
        });
        assert_eq!(waiting.status_text, "Attempt 1 failed. Retrying in 1s...");

        let fractional = project(&ProjectionInput {
            status: EnhancementStatus::RetryPending,
            attempt: 2,
            retry_delay: Some(Duration::from_millis(1500)),
            ..ready()
        });
        assert_eq!(fractional.status_text, "Attempt 2 failed. Retrying in 1.5s...");
    }

    #[test]
    fn idle_guidance_follows_missing_inputs() {
        let text = |identity, image, prompt| {
            project(&ready().with_presence(identity, image, prompt)).status_text
        };
        assert_eq!(text(false, false, false), "Sign in to get started.");
        assert_eq!(text(true, false, false), "Upload a photo to enhance.");
        assert_eq!(text(true, true, false), "Describe the vibe you want.");
        assert_eq!(text(true, true, true), "Ready to enhance.");
    }

    #[test]
    fn latest_message_wins_over_guidance() {
        let state = project(&ProjectionInput {
            status: EnhancementStatus::Failed,
            message: Some("Failed to enhance photo. Check the logs for details."),
            ..ready()
        });
        assert_eq!(
            state.status_text,
            "Failed to enhance photo. Check the logs for details."
        );
    }

    #[test]
    fn success_text_carries_persistence_warning() {
        let state = project(&ProjectionInput {
            status: EnhancementStatus::Succeeded,
            message: Some("Photo enhanced successfully!"),
            persistence_warning: Some("Your vibe could not be saved: offline"),
            ..ready()
        });
        assert_eq!(
            state.status_text,
            "Photo enhanced successfully! Your vibe could not be saved: offline"
        );
    }

    #[test]
    fn failure_text_carries_persistence_warning() {
        let state = project(&ProjectionInput {
            status: EnhancementStatus::Failed,
            message: Some("Failed to enhance photo. Check the logs for details."),
            persistence_warning: Some("Your vibe could not be saved: offline"),
            ..ready()
        });
        assert_eq!(
            state.status_text,
            "Failed to enhance photo. Check the logs for details. \
             Your vibe could not be saved: offline"
        );
    }

    #[test]
    fn snapshot_fields_flow_into_input() {
        let snapshot = EnhancementSnapshot {
            status: EnhancementStatus::RetryPending,
            attempt: 2,
            max_attempts: 4,
            retry_delay: Some(Duration::from_secs(2)),
            ..EnhancementSnapshot::default()
        };
        let input = ProjectionInput::from_snapshot(&snapshot).with_presence(true, true, true);
        assert_eq!(
            project(&input).status_text,
            "Attempt 2 failed. Retrying in 2s..."
        );
    }
}
