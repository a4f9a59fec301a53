use super::types::{SessionMode, TimerRole};

pub(crate) fn reminder_message(role: TimerRole) -> String {
    match role {
        TimerRole::Reminder2h => {
            "Still working on your image? Send another instruction to keep editing, or say you're done and I'll send the final version.".to_string()
        }
        TimerRole::Reminder6h => {
            "Your image editing session is still open. It will be closed automatically if there is no activity for 24 hours.".to_string()
        }
        TimerRole::Cleanup24h => "Your image editing session has been closed.".to_string(),
    }
}

pub(crate) fn edit_result_message(iteration_count: u32, mode: SessionMode) -> String {
    match mode {
        SessionMode::PromptOnly => format!("Here is edit #{}.", iteration_count),
        SessionMode::ReferenceGuided => {
            format!("Here is edit #{} (using your reference image).", iteration_count)
        }
    }
}

pub(crate) fn edit_failed_message(reason: &str) -> String {
    format!("The edit failed: {}", reason)
}

pub(crate) fn edit_superseded_message() -> String {
    "The session changed while that edit was running, so its result was discarded.".to_string()
}

pub(crate) fn final_image_message(iteration_count: u32) -> String {
    format!(
        "Here is your final image after {} edit(s). The session is now closed.",
        iteration_count
    )
}
