use super::task::Task;

/// Client-side narrowing of the loaded task set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub search: String,
    pub requester_email: String,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty() && self.requester_email.trim().is_empty()
    }

    pub fn matches(&self, task: &Task) -> bool {
        let email = self.requester_email.trim().to_lowercase();
        if !email.is_empty() {
            let by_owner = task.owners.iter().any(|o| {
                o.email
                    .as_deref()
                    .is_some_and(|e| e.to_lowercase().contains(&email))
            });
            let by_creator = task
                .created_by
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&email));
            if !by_owner && !by_creator {
                return false;
            }
        }

        let search = self.search.trim().to_lowercase();
        if !search.is_empty() && !task.name.to_lowercase().contains(&search) {
            return false;
        }
        true
    }

    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        tasks.iter().filter(|t| self.matches(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::status::Status;
    use crate::model::task::{Owner, Priority};

    fn task(name: &str, owner_email: Option<&str>, created_by: Option<&str>) -> Task {
        Task {
            id: name.to_lowercase().replace(' ', "-"),
            project_id: "1".into(),
            tasklist_id: Some("10".into()),
            name: name.into(),
            description: String::new(),
            priority: Priority::Medium,
            status: Status::open_sentinel(),
            owners: owner_email
                .map(|e| {
                    vec![Owner {
                        name: "Owner".into(),
                        email: Some(e.into()),
                    }]
                })
                .unwrap_or_default(),
            created_by: created_by.map(String::from),
        }
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let tasks = vec![task("Fix login", None, None), task("Write docs", None, None)];
        let filter = TaskFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&tasks).len(), 2);
    }

    #[test]
    fn search_is_case_insensitive_on_name() {
        let tasks = vec![task("Fix LOGIN page", None, None), task("Write docs", None, None)];
        let filter = TaskFilter {
            search: "login".into(),
            ..Default::default()
        };
        let visible = filter.apply(&tasks);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Fix LOGIN page");
    }

    #[test]
    fn requester_email_matches_owner_or_creator() {
        let tasks = vec![
            task("Owned", Some("Customer@Example.com"), None),
            task("Created", None, Some("customer@example.com")),
            task("Other", Some("someone@else.org"), Some("x@y.z")),
        ];
        let filter = TaskFilter {
            requester_email: "customer@example".into(),
            ..Default::default()
        };
        let names: Vec<&str> = filter.apply(&tasks).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Owned", "Created"]);
    }

    #[test]
    fn both_criteria_must_hold() {
        let tasks = vec![
            task("Fix login", Some("a@b.c"), None),
            task("Fix logout", Some("d@e.f"), None),
        ];
        let filter = TaskFilter {
            search: "fix".into(),
            requester_email: "a@b".into(),
        };
        let visible = filter.apply(&tasks);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Fix login");
    }
}
