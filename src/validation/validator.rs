use {
    super::{FieldEntry, engine},
    crate::{DataSource, Result},
    std::{fmt, sync::Arc},
};

/// Runs field entries through their rule chains.
///
/// Entries are checked in order. A blank value records the blank message and
/// skips the entry's rules; otherwise the first failing rule records its
/// message. Every entry contributes at most one message, and an empty result
/// means the whole submission is valid.
#[derive(Clone, Default)]
pub struct Validator {
    data_source: Option<Arc<dyn DataSource>>,
}

impl Validator {
    /// A validator without database access. `unique` rules fail with a
    /// configuration error.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(data_source);
        self
    }

    pub fn data_source(&self) -> Option<&Arc<dyn DataSource>> {
        self.data_source.as_ref()
    }

    /// Validates `entries`, returning the ordered list of messages.
    pub async fn validate(&self, entries: &[FieldEntry]) -> Result<Vec<String>> {
        let mut errors = Vec::new();

        for (position, entry) in entries.iter().enumerate() {
            if entry.value.trim().is_empty() {
                errors.push(engine::blank_message(&entry.label));
                continue;
            }

            for rule in entry.rules.rules() {
                if let Some(message) =
                    engine::evaluate(rule, position, entries, self.data_source.as_ref()).await?
                {
                    tracing::debug!(field = %entry.label, %rule, "validation failed");
                    errors.push(message);
                    break;
                }
            }
        }

        Ok(errors)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("data_source", &self.data_source.is_some())
            .finish()
    }
}
