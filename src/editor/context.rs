use serde::{Deserialize, Serialize};

/// Where the edited document lives; quoted in the body of every issue
/// created from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorContext {
    /// Path of the content file inside the repository
    pub file_path: String,
    /// URL of the editor page showing the file
    pub editor_url: String,
}

impl EditorContext {
    pub fn new(file_path: impl Into<String>, editor_url: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            editor_url: editor_url.into(),
        }
    }

    /// Issue body: the selected text followed by a context block.
    pub fn issue_body(&self, selected: &str) -> String {
        format!(
            "{}\n\n---\n**Context:**\n- **File:** `{}`\n- **Editor:** [Link]({})",
            selected, self.file_path, self.editor_url
        )
    }
}
