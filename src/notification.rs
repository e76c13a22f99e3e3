use crate::enhance::EnhancementOutcome;

const APP_NAME: &str = "VibeCode";

pub fn send(body: impl Into<String>) {
    let body = body.into();
    if let Err(err) = notify_rust::Notification::new()
        .appname(APP_NAME)
        .summary(APP_NAME)
        .body(&body)
        .show()
    {
        tracing::warn!("system notification failed: {err}");
    }
}

/// Desktop notification text for a finished enhancement, if it deserves one.
pub fn outcome_body(outcome: &EnhancementOutcome) -> Option<String> {
    let (base, warning) = match outcome {
        EnhancementOutcome::Succeeded {
            persistence_warning,
            ..
        } => ("Photo enhanced successfully!", persistence_warning),
        EnhancementOutcome::Failed {
            message,
            persistence_warning,
            ..
        } => (message.as_str(), persistence_warning),
        EnhancementOutcome::Discarded => return None,
    };
    Some(match warning {
        Some(warning) => format!("{base} {warning}"),
        None => base.to_string(),
    })
}
