use {
    super::{CheckContext, ColumnCast, FieldEntry, Rule, UniqueRule},
    crate::{DataSource, Error, Result, SqlParam},
    regex::Regex,
    std::sync::{Arc, LazyLock},
};

static EMAIL_REGEXP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern is valid")
});

/// Message recorded when a value is blank.
pub(crate) fn blank_message(label: &str) -> String {
    format!("{label} no puede estar en blanco")
}

/// Evaluates one rule against the entry at `position` of `entries`.
///
/// Returns `Ok(Some(message))` when the value breaks the rule, `Ok(None)` when
/// it satisfies it, and `Err` for declaration mistakes or data-source failures.
pub async fn evaluate(
    rule: &Rule,
    position: usize,
    entries: &[FieldEntry],
    data_source: Option<&Arc<dyn DataSource>>,
) -> Result<Option<String>> {
    let entry = entries.get(position).ok_or_else(|| {
        Error::internal(format!(
            "rule evaluated at position {position} of {} entries",
            entries.len()
        ))
    })?;
    let label = entry.label.as_str();
    let value = entry.value.as_str();

    let failed = |message: String| Ok(Some(message));

    match rule {
        Rule::Digits => {
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                return failed(format!("{label} solo puede contener dígitos"));
            }
        }
        Rule::Letters => {
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphabetic()) {
                return failed(format!("{label} solo puede contener letras"));
            }
        }
        Rule::Email => {
            if !EMAIL_REGEXP.is_match(value) {
                return failed(format!("{label} no es un correo electrónico válido"));
            }
        }
        Rule::Password => {
            let letters = value.chars().filter(|c| c.is_ascii_alphabetic()).count();
            let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
            if letters < 3 || digits < 3 {
                return failed(format!(
                    "{label} debe contener al menos 3 letras y 3 dígitos"
                ));
            }
        }
        Rule::MinLen(min) => {
            if value.chars().count() < *min {
                return failed(format!("{label} no se encuentra en el rango de {min}"));
            }
        }
        Rule::LenRange { min, max } => {
            let len = value.chars().count();
            if len < *min || len > *max {
                return failed(format!(
                    "{label} no se encuentra en el rango de {min},{max}"
                ));
            }
        }
        Rule::Repeat { of } => {
            let other = match of {
                Some(reference) => entries
                    .iter()
                    .find(|e| &e.label == reference)
                    .ok_or_else(|| {
                        Error::config(format!(
                            "repeat rule on '{label}' names unknown field '{reference}'"
                        ))
                    })?,
                None => position
                    .checked_sub(1)
                    .and_then(|previous| entries.get(previous))
                    .ok_or_else(|| {
                        Error::config(format!(
                            "repeat rule on '{label}' has no preceding field to compare with"
                        ))
                    })?,
            };
            if other.value != entry.value {
                return failed(format!(
                    "El valor ingresado en {label} no es lo mismo que el ingresado en el campo {}",
                    other.label
                ));
            }
        }
        Rule::Unique(unique) => {
            let data_source = data_source.ok_or_else(|| {
                Error::config(format!(
                    "unique rule on '{label}' needs a data source"
                ))
            })?;
            if !is_unique(unique, value, data_source.as_ref()).await? {
                return failed(format!("{label} ya se encuentra registrado"));
            }
        }
        Rule::Custom => {
            let check = entry.check.as_ref().ok_or_else(|| {
                Error::config(format!(
                    "custom rule on '{label}' has no check attached"
                ))
            })?;
            let ctx = CheckContext {
                label: entry.label.clone(),
                value: entry.value.clone(),
                position,
                fields: entries
                    .iter()
                    .map(|e| (e.label.clone(), e.value.clone()))
                    .collect(),
                args: entry.args.clone(),
                data_source: data_source.cloned(),
            };
            match check.check(ctx).await? {
                Some(message) if !message.is_empty() => return failed(message),
                _ => {}
            }
        }
    }

    Ok(None)
}

/// Counts rows where the column equals `value`. A value that cannot be cast
/// to the column type cannot collide with any row.
async fn is_unique(rule: &UniqueRule, value: &str, data_source: &dyn DataSource) -> Result<bool> {
    let param = match rule.cast {
        None | Some(ColumnCast::Text) => SqlParam::Text(value.to_string()),
        Some(ColumnCast::Int) => match value.trim().parse::<i64>() {
            Ok(i) => SqlParam::Int(i),
            Err(_) => return Ok(true),
        },
        Some(ColumnCast::Bool) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "on" => SqlParam::Bool(true),
            "false" | "f" | "0" | "off" => SqlParam::Bool(false),
            _ => return Ok(true),
        },
    };

    let count = data_source
        .fetch_scalar(&rule.count_query(), &[param])
        .await?
        .unwrap_or(0);
    tracing::debug!(table = %rule.table, column = %rule.column, count, "uniqueness check");
    Ok(count == 0)
}
