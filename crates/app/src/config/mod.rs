use serde::{Deserialize, Serialize};

/// Query-string style range selection shared by every front end.
///
/// `from`/`to` (local `YYYY-MM-DD`) win over the named `range` preset.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RangeParams {
    pub range: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub project: Option<String>,
}

impl RangeParams {
    pub fn preset(range: &str) -> Self {
        Self {
            range: Some(range.to_string()),
            ..Self::default()
        }
    }

    pub fn project(&self) -> Option<&str> {
        self.project
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != "all")
    }
}
