use crate::actions::models::{AggregatedAction, FollowUpUnit, NewFollowUp, NewPrescription};
use crate::actions::ports::{FollowUpRepository, NoteRepository, PrescriptionRepository};
use crate::commands::models::{CommandExecutionResult, CommandInvocation};
use crate::hub::NotificationHub;
use chrono::{DateTime, Duration, Months, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Executes detected commands against the repositories and announces the
/// resulting actions on the hub.
pub struct CommandService {
    notes: Arc<dyn NoteRepository>,
    follow_ups: Arc<dyn FollowUpRepository>,
    prescriptions: Arc<dyn PrescriptionRepository>,
    hub: Arc<NotificationHub>,
}

impl CommandService {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        follow_ups: Arc<dyn FollowUpRepository>,
        prescriptions: Arc<dyn PrescriptionRepository>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            notes,
            follow_ups,
            prescriptions,
            hub,
        }
    }

    pub async fn execute(
        &self,
        conversation_id: Uuid,
        invocation: CommandInvocation,
    ) -> CommandExecutionResult {
        info!(
            conversation_id = %conversation_id,
            tool = %invocation.tool_name,
            "Executing voice command"
        );

        match invocation.tool_name.as_str() {
            "take_note" => self.take_note(conversation_id, &invocation.arguments).await,
            "schedule_follow_up" => {
                self.schedule_follow_up(conversation_id, &invocation.arguments)
                    .await
            }
            "write_prescription" => {
                self.write_prescription(conversation_id, &invocation.arguments)
                    .await
            }
            "request_summary" => CommandExecutionResult::acknowledged(
                "request_summary",
                "Summary request acknowledged",
            ),
            "request_medical_history" => CommandExecutionResult::acknowledged(
                "request_medical_history",
                "Medical history request acknowledged",
            ),
            other => CommandExecutionResult::not_found(other),
        }
    }

    async fn take_note(
        &self,
        conversation_id: Uuid,
        arguments: &serde_json::Value,
    ) -> CommandExecutionResult {
        let Some(content) = non_empty_string(arguments, "note_content") else {
            return CommandExecutionResult::error(
                "take_note",
                "Missing required argument: note_content",
            );
        };

        match self.notes.create(conversation_id, &content).await {
            Ok(note) => {
                self.hub
                    .notify_action_created(conversation_id, AggregatedAction::from(&note))
                    .await;
                CommandExecutionResult::success(
                    "take_note",
                    "Note recorded",
                    serde_json::json!({ "note": note }),
                )
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist note");
                CommandExecutionResult::error("take_note", "Failed to save note")
            }
        }
    }

    async fn schedule_follow_up(
        &self,
        conversation_id: Uuid,
        arguments: &serde_json::Value,
    ) -> CommandExecutionResult {
        let duration = arguments
            .get("duration")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
        let Some(duration) = duration.filter(|d| *d > 0) else {
            return CommandExecutionResult::error(
                "schedule_follow_up",
                "Argument 'duration' must be a positive number",
            );
        };

        let unit = arguments
            .get("unit")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<FollowUpUnit>().ok());
        let Some(unit) = unit else {
            return CommandExecutionResult::error(
                "schedule_follow_up",
                "Argument 'unit' must be one of: day, week, month",
            );
        };

        let details = non_empty_string(arguments, "details");
        let Some(scheduled_for) = schedule_from_now(Utc::now(), duration, unit) else {
            return CommandExecutionResult::error(
                "schedule_follow_up",
                "Follow-up date is out of range",
            );
        };

        let new_follow_up = NewFollowUp {
            conversation_id,
            duration: duration as i32,
            unit,
            details,
            scheduled_for,
        };

        match self.follow_ups.create(new_follow_up).await {
            Ok(follow_up) => {
                self.hub
                    .notify_action_created(conversation_id, AggregatedAction::from(&follow_up))
                    .await;
                CommandExecutionResult::success(
                    "schedule_follow_up",
                    "Follow-up scheduled",
                    serde_json::json!({ "followUp": follow_up }),
                )
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist follow-up");
                CommandExecutionResult::error("schedule_follow_up", "Failed to save follow-up")
            }
        }
    }

    async fn write_prescription(
        &self,
        conversation_id: Uuid,
        arguments: &serde_json::Value,
    ) -> CommandExecutionResult {
        let medication_name = non_empty_string(arguments, "medication_name");
        let dosage = non_empty_string(arguments, "dosage");
        let frequency = non_empty_string(arguments, "frequency");

        let (Some(medication_name), Some(dosage), Some(frequency)) =
            (medication_name, dosage, frequency)
        else {
            return CommandExecutionResult::error(
                "write_prescription",
                "Missing required arguments: medication_name, dosage, frequency",
            );
        };

        let new_prescription = NewPrescription {
            conversation_id,
            medication_name,
            dosage,
            frequency,
            details: non_empty_string(arguments, "details"),
        };

        match self.prescriptions.create(new_prescription).await {
            Ok(prescription) => {
                self.hub
                    .notify_action_created(conversation_id, AggregatedAction::from(&prescription))
                    .await;
                CommandExecutionResult::success(
                    "write_prescription",
                    "Prescription recorded",
                    serde_json::json!({ "prescription": prescription }),
                )
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist prescription");
                CommandExecutionResult::error("write_prescription", "Failed to save prescription")
            }
        }
    }
}

fn non_empty_string(arguments: &serde_json::Value, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn schedule_from_now(now: DateTime<Utc>, duration: i64, unit: FollowUpUnit) -> Option<DateTime<Utc>> {
    match unit {
        FollowUpUnit::Day => now.checked_add_signed(Duration::days(duration)),
        FollowUpUnit::Week => now.checked_add_signed(Duration::weeks(duration)),
        FollowUpUnit::Month => now.checked_add_months(Months::new(duration.try_into().ok()?)),
    }
}
