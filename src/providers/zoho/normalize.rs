use serde_json::Value;

use super::gateway::RawResult;
use crate::model::bug::Ack;
use crate::model::project::{Project, Tasklist};
use crate::model::status::{Status, StatusCategory};
use crate::model::task::{Owner, Priority, Task};

/// Identifier as a string, preferring `id_string` over `id`. Numbers keep
/// their literal digits.
pub fn id_of(obj: &Value) -> Option<String> {
    let explicit = obj
        .get("id_string")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty());
    if let Some(id) = explicit {
        return Some(id.trim().to_string());
    }
    match obj.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn text(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

pub fn collection<'a>(raw: &'a RawResult, keys: &[&str]) -> Vec<&'a Value> {
    let RawResult::Json(value) = raw else {
        return Vec::new();
    };
    let items = match value {
        Value::Array(items) => Some(items),
        _ => keys
            .iter()
            .find_map(|k| value.get(*k).and_then(Value::as_array)),
    };
    items
        .map(|items| items.iter().filter(|v| v.is_object()).collect())
        .unwrap_or_default()
}

/// The single object a write returned, from `{plural: [obj]}`, `{singular: obj}`
/// or a bare object carrying an id.
pub fn written<'a>(raw: &'a RawResult, plural: &str, singular: &str) -> Option<&'a Value> {
    let RawResult::Json(value) = raw else {
        return None;
    };
    value
        .get(plural)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .or_else(|| value.get(singular))
        .or_else(|| id_of(value).map(|_| value))
        .filter(|v| v.is_object())
}

pub fn project(obj: &Value) -> Project {
    Project {
        id: id_of(obj).unwrap_or_default(),
        name: text(obj, &["name"]).unwrap_or_default(),
    }
}

pub fn projects(raw: &RawResult) -> Vec<Project> {
    collection(raw, &["projects"]).into_iter().map(project).collect()
}

pub fn tasklist(obj: &Value, project_id: &str) -> Tasklist {
    Tasklist {
        id: id_of(obj).unwrap_or_default(),
        project_id: project_id.to_string(),
        name: text(obj, &["name"]).unwrap_or_default(),
    }
}

pub fn tasklists(raw: &RawResult, project_id: &str) -> Vec<Tasklist> {
    collection(raw, &["tasklists"])
        .into_iter()
        .map(|obj| tasklist(obj, project_id))
        .filter(|tl| !tl.id.is_empty())
        .collect()
}

fn category_of(obj: &Value) -> StatusCategory {
    let closed_flag = ["is_closed_type", "is_closed"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_bool));
    if let Some(closed) = closed_flag {
        return if closed {
            StatusCategory::Closed
        } else {
            StatusCategory::Open
        };
    }
    match text(obj, &["type", "status_type"]) {
        Some(kind) if kind.eq_ignore_ascii_case("closed") => StatusCategory::Closed,
        _ => StatusCategory::Open,
    }
}

/// A status object, or a bare status name. `None` when there is nothing to go on.
pub fn status(value: &Value) -> Option<Status> {
    if let Some(name) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) {
        let category = if ["closed", "completed", "cancelled"]
            .iter()
            .any(|c| name.eq_ignore_ascii_case(c))
        {
            StatusCategory::Closed
        } else {
            StatusCategory::Open
        };
        return Some(Status {
            id: String::new(),
            name: name.to_string(),
            category,
            color_hint: category.default_color().to_string(),
        });
    }
    if !value.is_object() {
        return None;
    }

    let id = id_of(value);
    let name = text(value, &["name"]);
    if id.is_none() && name.is_none() {
        return None;
    }
    let category = category_of(value);
    Some(Status {
        id: id.unwrap_or_default(),
        name: name.unwrap_or_else(|| "Unnamed status".to_string()),
        category,
        color_hint: text(value, &["color_code", "color_hexcode", "color"])
            .unwrap_or_else(|| category.default_color().to_string()),
    })
}

pub fn statuses(raw: &RawResult) -> Vec<Status> {
    collection(raw, &["statuses", "status", "custom_statuses"])
        .into_iter()
        .filter_map(status)
        .collect()
}

fn priority(value: Option<&Value>) -> Priority {
    let name = match value {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(obj @ Value::Object(_)) => obj.get("name").and_then(Value::as_str),
        _ => None,
    };
    name.and_then(|n| n.parse().ok()).unwrap_or_default()
}

fn owners(obj: &Value) -> Vec<Owner> {
    let list = obj
        .get("details")
        .and_then(|d| d.get("owners"))
        .or_else(|| obj.get("owners"))
        .and_then(Value::as_array);
    list.map(|owners| {
        owners
            .iter()
            .filter(|o| o.is_object())
            .map(|o| Owner {
                name: text(o, &["name", "full_name", "display_name"]).unwrap_or_default(),
                email: text(o, &["email"]),
            })
            .collect()
    })
    .unwrap_or_default()
}

fn created_by(obj: &Value) -> Option<String> {
    let field = obj
        .get("created_by")
        .or_else(|| obj.get("details").and_then(|d| d.get("created_by")));
    match field {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(person @ Value::Object(_)) => text(person, &["email", "name"]),
        _ => text(obj, &["created_by_email"]),
    }
}

pub fn task(obj: &Value, project_id: &str) -> Task {
    let tasklist_id = obj
        .get("tasklist")
        .and_then(id_of)
        .or_else(|| match obj.get("tasklist_id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

    Task {
        id: id_of(obj).unwrap_or_default(),
        project_id: project_id.to_string(),
        tasklist_id,
        name: text(obj, &["name", "title"]).unwrap_or_default(),
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        priority: priority(obj.get("priority")),
        status: obj
            .get("status")
            .and_then(status)
            .unwrap_or_else(Status::open_sentinel),
        owners: owners(obj),
        created_by: created_by(obj),
    }
}

pub fn tasks(raw: &RawResult, project_id: &str) -> Vec<Task> {
    collection(raw, &["tasks"])
        .into_iter()
        .map(|obj| task(obj, project_id))
        .collect()
}

pub fn ack(raw: &RawResult, fallback: &str) -> Ack {
    match raw {
        RawResult::Json(value) => {
            let id = id_of(value).or_else(|| {
                ["issues", "bugs", "tasks"]
                    .iter()
                    .find_map(|k| value.get(*k).and_then(Value::as_array))
                    .and_then(|items| items.first())
                    .and_then(id_of)
            });
            Ack {
                id,
                message: text(value, &["message"]).unwrap_or_else(|| fallback.to_string()),
            }
        }
        RawResult::Empty | RawResult::Ack => Ack {
            id: None,
            message: fallback.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(text: &str) -> RawResult {
        RawResult::Json(serde_json::from_str(text).unwrap())
    }

    #[test]
    fn large_numeric_ids_keep_every_digit() {
        let projects = projects(&raw(
            r#"{"projects":[{"id":2595946000000123456,"name":"Big"}]}"#,
        ));
        assert_eq!(projects[0].id, "2595946000000123456");

        let beyond_u64 = projects_from_literal("123456789012345678901234567890");
        assert_eq!(beyond_u64, "123456789012345678901234567890");
    }

    fn projects_from_literal(digits: &str) -> String {
        let body = format!(r#"{{"projects":[{{"id":{digits},"name":"x"}}]}}"#);
        projects(&raw(&body))[0].id.clone()
    }

    #[test]
    fn id_string_wins_over_numeric_id() {
        let obj = json!({ "id": 1.5, "id_string": "2595946000000123457" });
        assert_eq!(id_of(&obj).as_deref(), Some("2595946000000123457"));
    }

    #[test]
    fn empty_results_give_empty_collections() {
        assert!(projects(&RawResult::Empty).is_empty());
        assert!(tasks(&RawResult::Ack, "1").is_empty());
        assert!(statuses(&raw(r#"{"statuses":[]}"#)).is_empty());
        assert!(tasklists(&raw(r#"{"unexpected":true}"#), "1").is_empty());
    }

    #[test]
    fn bare_arrays_are_accepted() {
        let projects = projects(&raw(r#"[{"id":"1","name":"A"}, 42, {"id":"2"}]"#));
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1].name, "");
    }

    #[test]
    fn task_without_priority_is_medium() {
        let task = task(&json!({ "id": "7", "name": "Fix login" }), "1");
        assert_eq!(task.priority, Priority::Medium);
    }

    #[test]
    fn task_with_unknown_priority_is_medium() {
        let task = task(&json!({ "id": "7", "priority": "Urgent!!" }), "1");
        assert_eq!(task.priority, Priority::Medium);
    }

    #[test]
    fn task_without_status_is_open_sentinel() {
        let task = task(&json!({ "id": "7", "name": "Fix login" }), "1");
        assert_eq!(task.status, Status::open_sentinel());
        let empty_status = super::task(&json!({ "id": "8", "status": {} }), "1");
        assert_eq!(empty_status.status, Status::open_sentinel());
    }

    #[test]
    fn restapi_task_shape() {
        let tasks = tasks(
            &raw(
                r##"{"tasks":[{
                    "id": 2595946000000200001,
                    "id_string": "2595946000000200001",
                    "name": "Fix login",
                    "description": "SSO broken",
                    "priority": "High",
                    "status": {"id": "2595946000000016071", "name": "In Progress", "type": "open", "color_code": "#fbc11e"},
                    "tasklist": {"id": 2595946000000300001, "id_string": "2595946000000300001", "name": "General"},
                    "details": {"owners": [
                        {"name": "Ada", "email": "ada@example.com"},
                        {"name": "Grace"}
                    ]},
                    "created_by": "Linus"
                }]}"##,
            ),
            "2595946000000123456",
        );
        let t = &tasks[0];
        assert_eq!(t.id, "2595946000000200001");
        assert_eq!(t.project_id, "2595946000000123456");
        assert_eq!(t.tasklist_id.as_deref(), Some("2595946000000300001"));
        assert_eq!(t.priority, Priority::High);
        assert_eq!(t.status.name, "In Progress");
        assert_eq!(t.status.color_hint, "#fbc11e");
        assert_eq!(t.owners.len(), 2);
        assert_eq!(t.owners[0].email.as_deref(), Some("ada@example.com"));
        assert_eq!(t.owners[1].name, "Grace");
        assert_eq!(t.created_by.as_deref(), Some("Linus"));
    }

    #[test]
    fn v3_task_shape() {
        let t = task(
            &json!({
                "id": "42",
                "name": "Ship it",
                "priority": "none",
                "status": { "id": "9", "name": "Closed", "is_closed_type": true },
                "owners": [{ "full_name": "Ada", "email": "ada@example.com" }],
                "created_by": { "email": "req@example.com", "name": "Requester" }
            }),
            "1",
        );
        assert_eq!(t.priority, Priority::None);
        assert_eq!(t.status.category, StatusCategory::Closed);
        assert_eq!(t.status.color_hint, StatusCategory::Closed.default_color());
        assert_eq!(t.owners[0].name, "Ada");
        assert_eq!(t.created_by.as_deref(), Some("req@example.com"));
        assert!(t.tasklist_id.is_none());
    }

    #[test]
    fn status_name_only_is_accepted() {
        let s = status(&json!("Completed")).unwrap();
        assert_eq!(s.name, "Completed");
        assert_eq!(s.category, StatusCategory::Closed);
        assert!(status(&json!(null)).is_none());
    }

    #[test]
    fn written_finds_object_in_any_envelope() {
        let wrapped = raw(r#"{"tasks":[{"id":"1"}]}"#);
        let single = raw(r#"{"tasklist":{"id":"2"}}"#);
        let bare = raw(r#"{"id":"3","name":"x"}"#);
        let nothing = raw(r#"{"status":"ok"}"#);
        assert_eq!(written(&wrapped, "tasks", "task").and_then(id_of).as_deref(), Some("1"));
        assert_eq!(written(&single, "tasklists", "tasklist").and_then(id_of).as_deref(), Some("2"));
        assert_eq!(written(&bare, "tasks", "task").and_then(id_of).as_deref(), Some("3"));
        assert!(written(&nothing, "tasks", "task").is_none());
        assert!(written(&RawResult::Ack, "tasks", "task").is_none());
    }

    #[test]
    fn ack_reads_id_and_message_when_present() {
        let a = ack(&raw(r#"{"issues":[{"id":"55"}]}"#), "Bug created");
        assert_eq!(a.id.as_deref(), Some("55"));
        assert_eq!(a.message, "Bug created");
        let b = ack(&RawResult::Ack, "Bug created");
        assert_eq!(b.id, None);
    }
}
