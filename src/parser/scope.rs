//! Scope tracking for the definition walk.

use crate::error::GraphError;

/// `fileId::scopePath.name`, or `fileId::name` at the top level.
pub fn qualified_name(file_id: &str, scope_path: Option<&str>, name: &str) -> String {
    match scope_path {
        Some(scope) => format!("{file_id}::{scope}.{name}"),
        None => format!("{file_id}::{name}"),
    }
}

#[derive(Debug, Clone)]
struct ScopeFrame {
    name: String,
    definition: usize,
}

/// Stack of enclosing Definitions, threaded by `&mut` through the recursive
/// walk of one file. Never shared between files.
#[derive(Debug, Default)]
pub struct ScopeStack {
    file_id: String,
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub fn new(file_id: &str) -> Self {
        Self {
            file_id: file_id.to_owned(),
            frames: Vec::new(),
        }
    }

    /// Dot-joined names of the enclosing Definitions, `None` when empty.
    pub fn path(&self) -> Option<String> {
        if self.frames.is_empty() {
            return None;
        }
        let names: Vec<&str> = self.frames.iter().map(|f| f.name.as_str()).collect();
        Some(names.join("."))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Index of the innermost enclosing Definition.
    pub fn current_definition(&self) -> Option<usize> {
        self.frames.last().map(|f| f.definition)
    }

    /// Push a Definition after it has been recorded.
    pub fn push(&mut self, name: &str, definition: usize) {
        self.frames.push(ScopeFrame {
            name: name.to_owned(),
            definition,
        });
    }

    /// Pop the frame pushed for `expected`. Anything else is an invariant
    /// violation.
    pub fn pop(&mut self, expected: usize, start_line: usize, end_line: usize) -> Result<(), GraphError> {
        match self.frames.pop() {
            Some(frame) if frame.definition == expected => Ok(()),
            Some(frame) => Err(self.imbalance(
                start_line,
                end_line,
                format!(
                    "expected to leave definition #{expected}, found `{}` (#{})",
                    frame.name, frame.definition
                ),
            )),
            None => Err(self.imbalance(start_line, end_line, "pop on empty scope stack".into())),
        }
    }

    /// Called once the walk is complete.
    pub fn finish(self, line_count: usize) -> Result<(), GraphError> {
        if self.frames.is_empty() {
            return Ok(());
        }
        let open = self.path().unwrap_or_default();
        Err(self.imbalance(1, line_count, format!("scopes left open at end of file: {open}")))
    }

    fn imbalance(&self, start_line: usize, end_line: usize, detail: String) -> GraphError {
        GraphError::ScopeImbalance {
            path: self.file_id.clone(),
            start_line,
            end_line,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_forms() {
        assert_eq!(qualified_name("src/a.ts", None, "f"), "src/a.ts::f");
        assert_eq!(qualified_name("src/a.ts", Some("A.b"), "c"), "src/a.ts::A.b.c");
    }

    #[test]
    fn test_push_pop_balance() {
        let mut stack = ScopeStack::new("a.ts");
        assert_eq!(stack.path(), None);
        stack.push("App", 0);
        stack.push("handle", 1);
        assert_eq!(stack.path().as_deref(), Some("App.handle"));
        assert_eq!(stack.current_definition(), Some(1));
        stack.pop(1, 3, 5).unwrap();
        stack.pop(0, 1, 9).unwrap();
        assert_eq!(stack.depth(), 0);
        stack.finish(9).unwrap();
    }

    #[test]
    fn test_pop_mismatch_is_imbalance() {
        let mut stack = ScopeStack::new("a.ts");
        stack.push("App", 0);
        let err = stack.pop(4, 2, 3).unwrap_err();
        assert!(matches!(err, GraphError::ScopeImbalance { start_line: 2, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_pop_empty_and_unfinished() {
        let mut stack = ScopeStack::new("a.ts");
        assert!(stack.pop(0, 1, 1).is_err());

        let mut open = ScopeStack::new("a.ts");
        open.push("Left", 0);
        let err = open.finish(10).unwrap_err();
        assert!(err.to_string().contains("Left"));
    }
}
