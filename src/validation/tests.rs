use {
    super::*,
    crate::{DataSource, ErrorKind, Result, Row, SqlParam},
    async_trait::async_trait,
    proptest::prelude::*,
    std::sync::{Arc, Mutex},
};

// ============================================================================
// Test fixtures
// ============================================================================

/// Answers every count query with a fixed number and records what it was asked.
#[derive(Default)]
struct CountingSource {
    count: i64,
    queries: Mutex<Vec<(String, Vec<SqlParam>)>>,
}

impl CountingSource {
    fn returning(count: i64) -> Arc<Self> {
        Arc::new(Self {
            count,
            ..Default::default()
        })
    }

    fn queries(&self) -> Vec<(String, Vec<SqlParam>)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for CountingSource {
    async fn fetch_rows(&self, _sql: &str, _params: &[SqlParam]) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn fetch_scalar(&self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>> {
        self.queries
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(Some(self.count))
    }

    async fn execute(&self, _sql: &str, _params: &[SqlParam]) -> Result<u64> {
        Ok(0)
    }
}

struct FailingSource;

#[async_trait]
impl DataSource for FailingSource {
    async fn fetch_rows(&self, _sql: &str, _params: &[SqlParam]) -> Result<Vec<Row>> {
        Err(crate::Error::database("connection refused"))
    }

    async fn fetch_scalar(&self, _sql: &str, _params: &[SqlParam]) -> Result<Option<i64>> {
        Err(crate::Error::database("connection refused"))
    }

    async fn execute(&self, _sql: &str, _params: &[SqlParam]) -> Result<u64> {
        Err(crate::Error::database("connection refused"))
    }
}

fn entry(label: &str, value: &str, chain: &str) -> FieldEntry {
    FieldEntry::new(label, value, chain).unwrap()
}

async fn validate(entries: &[FieldEntry]) -> Result<Vec<String>> {
    Validator::new().validate(entries).await
}

// ============================================================================
// Structural rules
// ============================================================================

#[tokio::test]
async fn email_rule_end_to_end() {
    let errors = validate(&[entry("Correo", "bad-email", "email")])
        .await
        .unwrap();
    assert_eq!(errors, vec!["Correo no es un correo electrónico válido"]);

    let errors = validate(&[entry("Correo", "john@example.com", "email")])
        .await
        .unwrap();
    assert!(errors.is_empty());
}

#[tokio::test]
async fn digits_and_letters() {
    let errors = validate(&[
        entry("Documento", "12a45", "digits"),
        entry("Documento", "12345", "digits"),
        entry("Nombres", "Ana1", "letters"),
        entry("Nombres", "Ana", "letters"),
    ])
    .await
    .unwrap();
    assert_eq!(
        errors,
        vec![
            "Documento solo puede contener dígitos",
            "Nombres solo puede contener letras"
        ]
    );
}

#[tokio::test]
async fn password_needs_three_letters_and_three_digits() {
    let errors = validate(&[
        entry("Contraseña", "abc12", "password"),
        entry("Contraseña", "ab123", "password"),
        entry("Contraseña", "abc123", "password"),
    ])
    .await
    .unwrap();
    assert_eq!(
        errors,
        vec![
            "Contraseña debe contener al menos 3 letras y 3 dígitos",
            "Contraseña debe contener al menos 3 letras y 3 dígitos"
        ]
    );
}

#[tokio::test]
async fn min_len_message_names_bound() {
    let errors = validate(&[entry("Dirección", "ab", "len:3")])
        .await
        .unwrap();
    assert_eq!(errors, vec!["Dirección no se encuentra en el rango de 3"]);
}

#[tokio::test]
async fn len_counts_characters_not_bytes() {
    let errors = validate(&[entry("Apellidos", "Núñez", "len:5,5")])
        .await
        .unwrap();
    assert!(errors.is_empty());
}

// ============================================================================
// Blank values and short-circuiting
// ============================================================================

#[tokio::test]
async fn blank_value_yields_single_error() {
    let errors = validate(&[entry("Correo", "   ", "len:3|email|digits")])
        .await
        .unwrap();
    assert_eq!(errors, vec!["Correo no puede estar en blanco"]);
}

#[tokio::test]
async fn first_failing_rule_wins() {
    let errors = validate(&[entry("Teléfono", "x", "len:6,9|digits")])
        .await
        .unwrap();
    assert_eq!(errors, vec!["Teléfono no se encuentra en el rango de 6,9"]);
}

#[tokio::test]
async fn errors_follow_entry_order() {
    let errors = validate(&[
        entry("B", "", "digits"),
        entry("A", "ok", "len:1"),
        entry("C", "1", "letters"),
    ])
    .await
    .unwrap();
    assert_eq!(
        errors,
        vec!["B no puede estar en blanco", "C solo puede contener letras"]
    );
}

// ============================================================================
// repeat
// ============================================================================

#[tokio::test]
async fn repeat_compares_with_previous_entry() {
    let errors = validate(&[
        entry("Contraseña", "abc123", "password"),
        entry("Confirmación", "abc124", "repeat"),
    ])
    .await
    .unwrap();
    assert_eq!(
        errors,
        vec![
            "El valor ingresado en Confirmación no es lo mismo que el ingresado en el campo Contraseña"
        ]
    );

    let errors = validate(&[
        entry("Contraseña", "abc123", "password"),
        entry("Confirmación", "abc123", "repeat"),
    ])
    .await
    .unwrap();
    assert!(errors.is_empty());
}

#[tokio::test]
async fn repeat_at_first_position_is_a_configuration_error() {
    let err = validate(&[entry("Confirmación", "abc123", "repeat")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn repeat_by_name_ignores_ordering() {
    let errors = validate(&[
        entry("Correo", "ana@uni.edu", "email"),
        entry("Nombres", "Ana", "letters"),
        entry("Confirmar correo", "ana@uni.edu", "repeat:Correo"),
    ])
    .await
    .unwrap();
    assert!(errors.is_empty());

    let err = validate(&[entry("Confirmar", "x", "repeat:Inexistente")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// ============================================================================
// unique
// ============================================================================

#[tokio::test]
async fn unique_counts_through_data_source() {
    let source = CountingSource::returning(1);
    let validator = Validator::new().with_data_source(source.clone());

    let errors = validator
        .validate(&[entry(
            "Correo",
            "ana@uni.edu",
            "email|unique:correo_electronico,usuario",
        )])
        .await
        .unwrap();
    assert_eq!(errors, vec!["Correo ya se encuentra registrado"]);
    assert_eq!(
        source.queries(),
        vec![(
            "SELECT COUNT(*) FROM usuario WHERE correo_electronico = $1".to_string(),
            vec![SqlParam::Text("ana@uni.edu".into())]
        )]
    );
}

#[tokio::test]
async fn unique_passes_on_zero_count_and_binds_casts() {
    let source = CountingSource::returning(0);
    let validator = Validator::new().with_data_source(source.clone());

    let errors = validator
        .validate(&[entry("Código", "2017", "unique:id<int>,usuario")])
        .await
        .unwrap();
    assert!(errors.is_empty());
    assert_eq!(source.queries()[0].1, vec![SqlParam::Int(2017)]);
}

#[tokio::test]
async fn unique_skips_query_for_uncastable_value() {
    let source = CountingSource::returning(5);
    let validator = Validator::new().with_data_source(source.clone());

    let errors = validator
        .validate(&[entry("Código", "abc", "unique:id<int>,usuario")])
        .await
        .unwrap();
    assert!(errors.is_empty());
    assert!(source.queries().is_empty());
}

#[tokio::test]
async fn unique_without_data_source_is_a_configuration_error() {
    let err = validate(&[entry("Correo", "a@b.co", "unique:correo_electronico,usuario")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn data_source_failure_propagates() {
    let validator = Validator::new().with_data_source(Arc::new(FailingSource));
    let err = validator
        .validate(&[entry("Correo", "a@b.co", "unique:correo_electronico,usuario")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
}

// ============================================================================
// custom
// ============================================================================

#[tokio::test]
async fn custom_message_is_recorded_verbatim() {
    let field = entry("Semestre", "13", "digits|custom").with_check(|ctx: CheckContext| async move {
        let n: u32 = ctx.value.parse().unwrap_or(0);
        Ok::<_, crate::Error>((n > 12).then(|| format!("{} debe estar entre 1 y 12", ctx.label)))
    });
    let errors = validate(&[field]).await.unwrap();
    assert_eq!(errors, vec!["Semestre debe estar entre 1 y 12"]);
}

#[tokio::test]
async fn custom_none_or_empty_passes() {
    let none = entry("A", "x", "custom")
        .with_check(|_ctx: CheckContext| async { Ok::<_, crate::Error>(None) });
    let empty = entry("B", "y", "custom")
        .with_check(|_ctx: CheckContext| async { Ok::<_, crate::Error>(Some(String::new())) });
    assert!(validate(&[none, empty]).await.unwrap().is_empty());
}

#[tokio::test]
async fn custom_sees_siblings_and_args() {
    let field = entry("Fin", "2024", "custom")
        .with_args(["Inicio"])
        .with_check(|ctx: CheckContext| async move {
            let start = ctx.field(&ctx.args[0]).unwrap_or_default().to_string();
            assert_eq!(ctx.position, 1);
            Ok::<_, crate::Error>((ctx.value < start).then(|| "Fin es anterior a Inicio".to_string()))
        });
    let errors = validate(&[entry("Inicio", "2025", "digits"), field])
        .await
        .unwrap();
    assert_eq!(errors, vec!["Fin es anterior a Inicio"]);
}

#[tokio::test]
async fn custom_without_check_is_a_configuration_error() {
    let err = validate(&[entry("A", "x", "custom")]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// ============================================================================
// FormSchema
// ============================================================================

#[tokio::test]
async fn form_schema_binds_and_validates() {
    let schema = FormSchema::new()
        .field("correo", "Correo", "len:6,128|email")
        .unwrap()
        .field("credencial", "Contraseña", "len:6,64|password")
        .unwrap()
        .field("confirmacion", "Confirmación", "repeat")
        .unwrap();

    let form = std::collections::BTreeMap::from([
        ("correo".to_string(), "ana@uni.edu".to_string()),
        ("credencial".to_string(), "abc123".to_string()),
    ]);
    let errors = validate(&schema.entries(&form)).await.unwrap();
    assert_eq!(errors, vec!["Confirmación no puede estar en blanco"]);
}

#[test]
fn form_schema_rejects_bad_declarations() {
    assert!(FormSchema::new().field("a", "A", "lenght:3").is_err());
    assert!(FormSchema::new().field("a", "A", "custom").is_err());
    assert!(
        FormSchema::new()
            .field("a", "A", "digits")
            .unwrap()
            .field("a", "A otra vez", "digits")
            .is_err()
    );
}

// ============================================================================
// Property-based tests
// ============================================================================

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn blank_values_produce_exactly_one_error(
        blank in "[ \t]{0,4}",
        chain in prop::sample::select(vec!["digits", "letters|len:3", "email|password", "len:1,2|digits"]),
    ) {
        let errors = run(validate(&[entry("Campo", &blank, chain)])).unwrap();
        prop_assert_eq!(errors, vec!["Campo no puede estar en blanco".to_string()]);
    }

    #[test]
    fn failing_first_rule_short_circuits(value in "[a-z]{1,5}") {
        let errors = run(validate(&[entry("Campo", &value, "digits|len:10|email")])).unwrap();
        prop_assert_eq!(errors.len(), 1);
        prop_assert_eq!(&errors[0], "Campo solo puede contener dígitos");
    }

    #[test]
    fn len_range_is_inclusive(min in 1usize..20, span in 0usize..20) {
        let max = min + span;
        let chain = format!("len:{min},{max}");
        for (len, ok) in [(min - 1, false), (min, true), (max, true), (max + 1, false)] {
            let value = "x".repeat(len);
            if value.is_empty() {
                continue;
            }
            let errors = run(validate(&[entry("Campo", &value, &chain)])).unwrap();
            prop_assert_eq!(errors.is_empty(), ok, "length {}", len);
        }
    }

    #[test]
    fn repeat_succeeds_iff_equal(a in "[a-z0-9]{1,8}", b in "[a-z0-9]{1,8}") {
        let errors = run(validate(&[
            entry("Primero", &a, "len:1"),
            entry("Segundo", &b, "repeat"),
        ])).unwrap();
        prop_assert_eq!(errors.is_empty(), a == b);
    }
}
