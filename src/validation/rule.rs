//! Rule tokens and their parsed form.
//!
//! A rule chain is written as a pipe-delimited string such as
//! `"len:14,128|email|unique:correo_electronico,usuario"` and parsed once into
//! a [`RuleChain`]. Parsing rejects every token the engine could not run, so
//! malformed declarations fail when a form schema is built rather than when a
//! user submits the form.

use {
    crate::{Error, Result},
    regex::Regex,
    std::{fmt, str::FromStr, sync::Arc, sync::LazyLock},
};

static IDENTIFIER_REGEXP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)(?:<([a-z]+)>)?$").expect("identifier pattern is valid")
});

/// How a value is bound when checked against a column in a `unique` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnCast {
    Int,
    Bool,
    Text,
}

impl FromStr for ColumnCast {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(ColumnCast::Int),
            "bool" => Ok(ColumnCast::Bool),
            "text" => Ok(ColumnCast::Text),
            other => Err(Error::config(format!("unknown column cast '<{other}>'"))),
        }
    }
}

impl fmt::Display for ColumnCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnCast::Int => write!(f, "int"),
            ColumnCast::Bool => write!(f, "bool"),
            ColumnCast::Text => write!(f, "text"),
        }
    }
}

/// Target of a `unique:<column>,<table>` rule. Both identifiers are checked
/// against `^[A-Za-z0-9_]+$` before they are interpolated into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueRule {
    pub column: String,
    pub table: String,
    pub cast: Option<ColumnCast>,
}

impl UniqueRule {
    /// The count query this rule runs, with the value bound as `$1`.
    pub fn count_query(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {} = $1",
            self.table, self.column
        )
    }
}

/// A single parsed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Only ASCII digits.
    Digits,
    /// Only ASCII letters.
    Letters,
    Email,
    /// At least three letters and three digits.
    Password,
    /// Length in characters of at least `min`.
    MinLen(usize),
    /// Length in characters within `min..=max`.
    LenRange { min: usize, max: usize },
    /// Equal to another entry: the named one, or the preceding one when `of` is `None`.
    Repeat { of: Option<String> },
    Unique(UniqueRule),
    /// Delegates to the check attached to the field entry.
    Custom,
}

impl Rule {
    fn parse_len(args: &str) -> Result<Rule> {
        let bound = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| Error::config(format!("malformed len rule 'len:{args}'")))
        };
        match args.split_once(',') {
            None => Ok(Rule::MinLen(bound(args)?)),
            Some((min, max)) => {
                let (min, max) = (bound(min)?, bound(max)?);
                if min > max {
                    return Err(Error::config(format!(
                        "len rule 'len:{args}' has a minimum above its maximum"
                    )));
                }
                Ok(Rule::LenRange { min, max })
            }
        }
    }

    fn parse_unique(args: &str) -> Result<Rule> {
        let Some((column, table)) = args.split_once(',') else {
            return Err(Error::config(format!(
                "unique rule 'unique:{args}' needs a column and a table"
            )));
        };

        let bad_identifier = || Error::config(format!("invalid identifier in 'unique:{args}'"));

        let caps = IDENTIFIER_REGEXP
            .captures(column.trim())
            .ok_or_else(bad_identifier)?;
        let cast = caps
            .get(2)
            .map(|m| m.as_str().parse::<ColumnCast>())
            .transpose()?;
        let column = caps[1].to_string();

        let table_caps = IDENTIFIER_REGEXP
            .captures(table.trim())
            .ok_or_else(bad_identifier)?;
        if table_caps.get(2).is_some() {
            return Err(bad_identifier());
        }

        Ok(Rule::Unique(UniqueRule {
            column,
            table: table_caps[1].to_string(),
            cast,
        }))
    }
}

impl FromStr for Rule {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        let token = token.trim();
        let (name, args) = match token.split_once(':') {
            Some((name, args)) => (name, Some(args)),
            None => (token, None),
        };

        match (name, args) {
            ("digits" | "DIGITS", None) => Ok(Rule::Digits),
            ("letters" | "LETTERS", None) => Ok(Rule::Letters),
            ("email", None) => Ok(Rule::Email),
            ("password", None) => Ok(Rule::Password),
            ("custom", None) => Ok(Rule::Custom),
            ("repeat", None) => Ok(Rule::Repeat { of: None }),
            ("repeat", Some(label)) if !label.trim().is_empty() => Ok(Rule::Repeat {
                of: Some(label.trim().to_string()),
            }),
            ("len", Some(args)) => Rule::parse_len(args),
            ("unique", Some(args)) => Rule::parse_unique(args),
            _ => Err(Error::config(format!(
                "unsupported validation rule '{token}'"
            ))),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Digits => write!(f, "digits"),
            Rule::Letters => write!(f, "letters"),
            Rule::Email => write!(f, "email"),
            Rule::Password => write!(f, "password"),
            Rule::MinLen(min) => write!(f, "len:{min}"),
            Rule::LenRange { min, max } => write!(f, "len:{min},{max}"),
            Rule::Repeat { of: None } => write!(f, "repeat"),
            Rule::Repeat { of: Some(label) } => write!(f, "repeat:{label}"),
            Rule::Unique(rule) => match rule.cast {
                Some(cast) => write!(f, "unique:{}<{}>,{}", rule.column, cast, rule.table),
                None => write!(f, "unique:{},{}", rule.column, rule.table),
            },
            Rule::Custom => write!(f, "custom"),
        }
    }
}

/// An ordered, immutable sequence of rules for one field.
///
/// ```
/// use campus_gate::validation::{Rule, RuleChain};
///
/// let chain: RuleChain = "len:8,64|password".parse().unwrap();
/// assert_eq!(chain.rules(), &[Rule::LenRange { min: 8, max: 64 }, Rule::Password]);
/// assert!("len:8|passwrd".parse::<RuleChain>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleChain(Arc<[Rule]>);

impl RuleChain {
    pub fn new(rules: impl Into<Arc<[Rule]>>) -> Self {
        Self(rules.into())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_custom(&self) -> bool {
        self.0.iter().any(|rule| matches!(rule, Rule::Custom))
    }
}

impl FromStr for RuleChain {
    type Err = Error;

    /// Parses `"rule|rule|..."`. The empty string is an empty chain; an empty
    /// token between pipes is rejected.
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(RuleChain::default());
        }
        let rules = s
            .split('|')
            .map(|token| {
                if token.trim().is_empty() {
                    Err(Error::config(format!("empty rule token in chain '{s}'")))
                } else {
                    token.parse::<Rule>()
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RuleChain(rules.into()))
    }
}

impl fmt::Display for RuleChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "|")?;
            }
            write!(f, "{rule}")?;
        }
        Ok(())
    }
}

impl From<Vec<Rule>> for RuleChain {
    fn from(rules: Vec<Rule>) -> Self {
        RuleChain(rules.into())
    }
}
