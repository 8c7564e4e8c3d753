use serde_json::{Value, json};

use super::registry::{BoxError, ToolDefinition};

pub const SCHEDULE_APPOINTMENT: &str = "schedule_appointment";

/// Books an appointment on the requested date. Every slot is at 10am.
pub fn schedule_appointment() -> ToolDefinition {
    ToolDefinition::new(
        SCHEDULE_APPOINTMENT,
        "Schedule an appointment for a given date.",
        json!({
            "type": "object",
            "properties": {
                "date": {
                    "type": "string",
                    "description": "The date of the appointment"
                }
            },
            "required": ["date"],
            "additionalProperties": false
        }),
        |args: Value| async move {
            let date = args
                .get("date")
                .and_then(Value::as_str)
                .ok_or_else(|| BoxError::from("missing date"))?;
            Ok::<_, BoxError>(format!("Appointment scheduled for {date} at 10am"))
        },
    )
}
