use {
    super::RuleChain,
    crate::{DataSource, Error, Result},
    async_trait::async_trait,
    std::{collections::BTreeMap, fmt, future::Future, sync::Arc},
};

/// Everything a custom check may look at.
#[derive(Clone)]
pub struct CheckContext {
    pub label: String,
    pub value: String,
    /// Index of this entry in the list being validated.
    pub position: usize,
    /// `(label, value)` of every entry in the list, in order.
    pub fields: Vec<(String, String)>,
    /// Extra arguments attached to the entry.
    pub args: Vec<String>,
    pub data_source: Option<Arc<dyn DataSource>>,
}

impl CheckContext {
    /// Value of the entry with the given label.
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }
}

/// An asynchronous predicate run by the `custom` rule.
///
/// `Ok(Some(message))` with a non-empty message fails the field; any other
/// `Ok` passes it. `Err` aborts the whole validation call.
///
/// Closures `Fn(CheckContext) -> impl Future<Output = Result<Option<String>>>`
/// implement this trait.
#[async_trait]
pub trait CustomCheck: Send + Sync {
    async fn check(&self, ctx: CheckContext) -> Result<Option<String>>;
}

#[async_trait]
impl<F, Fut> CustomCheck for F
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>>> + Send + 'static,
{
    async fn check(&self, ctx: CheckContext) -> Result<Option<String>> {
        (self)(ctx).await
    }
}

/// A value to validate, with the label used in messages and the rules to apply.
#[derive(Clone)]
pub struct FieldEntry {
    pub label: String,
    pub value: String,
    pub rules: RuleChain,
    pub check: Option<Arc<dyn CustomCheck>>,
    pub args: Vec<String>,
}

impl FieldEntry {
    /// Builds an entry, parsing `chain` as a pipe-delimited rule string.
    pub fn new(label: impl Into<String>, value: impl Into<String>, chain: &str) -> Result<Self> {
        Ok(Self::with_rules(label, value, chain.parse()?))
    }

    /// Builds an entry from an already parsed chain.
    pub fn with_rules(label: impl Into<String>, value: impl Into<String>, rules: RuleChain) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            rules,
            check: None,
            args: Vec::new(),
        }
    }

    /// Attaches the predicate run by the `custom` rule.
    #[must_use]
    pub fn with_check(mut self, check: impl CustomCheck + 'static) -> Self {
        self.check = Some(Arc::new(check));
        self
    }

    /// Attaches extra arguments passed to the custom check.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for FieldEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEntry")
            .field("label", &self.label)
            .field("value", &self.value)
            .field("rules", &self.rules.to_string())
            .field("check", &self.check.is_some())
            .field("args", &self.args)
            .finish()
    }
}

#[derive(Clone)]
struct FieldSpec {
    key: String,
    label: String,
    rules: RuleChain,
    check: Option<Arc<dyn CustomCheck>>,
    args: Vec<String>,
}

/// Declarations for a whole form, parsed once and bound to each submission.
///
/// ```
/// use campus_gate::validation::FormSchema;
/// use std::collections::BTreeMap;
///
/// let schema = FormSchema::new()
///     .field("correo", "Correo", "len:6,128|email").unwrap()
///     .field("credencial", "Contraseña", "len:8,64|password").unwrap()
///     .field("confirmacion", "Confirmación", "repeat").unwrap();
///
/// let form = BTreeMap::from([("correo".to_string(), "ana@uni.edu".to_string())]);
/// let entries = schema.entries(&form);
/// assert_eq!(entries.len(), 3);
/// assert_eq!(entries[1].value, "");
/// ```
#[derive(Clone, Default)]
pub struct FormSchema {
    fields: Vec<FieldSpec>,
}

impl FormSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a form field. Fails on an unparsable chain or a repeated key.
    pub fn field(self, key: &str, label: &str, chain: &str) -> Result<Self> {
        self.push(key, label, chain.parse()?, None)
    }

    /// Declares a form field whose chain contains `custom`.
    pub fn field_with_check(
        self,
        key: &str,
        label: &str,
        chain: &str,
        check: impl CustomCheck + 'static,
    ) -> Result<Self> {
        self.push(key, label, chain.parse()?, Some(Arc::new(check)))
    }

    /// Sets the custom-check arguments of the most recently declared field.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(last) = self.fields.last_mut() {
            last.args = args.into_iter().map(Into::into).collect();
        }
        self
    }

    fn push(
        mut self,
        key: &str,
        label: &str,
        rules: RuleChain,
        check: Option<Arc<dyn CustomCheck>>,
    ) -> Result<Self> {
        if self.fields.iter().any(|f| f.key == key) {
            return Err(Error::config(format!("form field '{key}' declared twice")));
        }
        if rules.contains_custom() && check.is_none() {
            return Err(Error::config(format!(
                "form field '{key}' uses the custom rule without a check"
            )));
        }
        self.fields.push(FieldSpec {
            key: key.to_string(),
            label: label.to_string(),
            rules,
            check,
            args: Vec::new(),
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Binds submitted values to the declared fields, in declaration order.
    /// Keys missing from `form` bind as blank values.
    pub fn entries(&self, form: &BTreeMap<String, String>) -> Vec<FieldEntry> {
        self.fields
            .iter()
            .map(|spec| FieldEntry {
                label: spec.label.clone(),
                value: form.get(&spec.key).cloned().unwrap_or_default(),
                rules: spec.rules.clone(),
                check: spec.check.clone(),
                args: spec.args.clone(),
            })
            .collect()
    }
}

impl fmt::Debug for FormSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.fields.iter().map(|s| (&s.key, &s.label)))
            .finish()
    }
}
