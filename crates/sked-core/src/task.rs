use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    #[serde(default)]
    pub id: String,

    /// Due date as `YYYYMMDD`.
    #[serde(default)]
    pub date: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,

    /// Raw repeat rule; empty when the task does not recur.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repeat: String,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn is_repeating(&self) -> bool {
        !self.repeat.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Task;

    #[test]
    fn empty_optional_fields_are_omitted() {
        let task = Task {
            id: "7".to_string(),
            date: "20240101".to_string(),
            title: "Water plants".to_string(),
            ..Task::default()
        };
        let json = serde_json::to_string(&task).expect("serialize");
        assert_eq!(
            json,
            r#"{"id":"7","date":"20240101","title":"Water plants"}"#
        );
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let task: Task = serde_json::from_str(r#"{"title":"Call mom","repeat":"d 7"}"#)
            .expect("deserialize");
        assert!(task.id.is_empty());
        assert!(task.date.is_empty());
        assert!(task.is_repeating());
    }
}
