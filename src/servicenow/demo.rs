use crate::servicenow::model::{IncidentDetails, IncidentNumber};

/// Canned records served when the instance cannot be reached and demo fallback is enabled.
pub fn demo_incident(number: &IncidentNumber) -> Option<IncidentDetails> {
    let (description, state, priority, assignee, sys_id) = match number.as_str() {
        "INC0008001" => (
            "Network connectivity issues affecting email services across multiple locations",
            "2",
            "1",
            "John Smith",
            "demo-sys-id-001",
        ),
        "INC0008002" => (
            "Database performance degradation causing application timeouts",
            "1",
            "2",
            "Sarah Johnson",
            "demo-sys-id-002",
        ),
        "INC0008111" => (
            "Critical infrastructure failure requiring immediate response",
            "2",
            "1",
            "Mike Chen",
            "demo-sys-id-111",
        ),
        _ => return None,
    };
    Some(IncidentDetails {
        number: number.to_string(),
        short_description: description.to_string(),
        state: state.to_string(),
        priority: priority.to_string(),
        assigned_to: assignee.to_string(),
        sys_id: sys_id.to_string(),
    })
}
