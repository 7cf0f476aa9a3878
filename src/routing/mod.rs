//!
//! Route composition for feature modules.
//!
//! Each feature module declares a nested [`RouteMap`] (with the builder or the
//! [`routes!`](crate::routes) macro). The [`RouteRegistry`] collects those
//! declarations, checks their shape, and builds a flat [`DispatchTable`] in
//! which every full path maps to exactly one handler. Paths are compiled to
//! [`PathPattern`]s when the table is registered against axum.
//!
mod map;
mod pattern;
mod registry;

pub use map::*;
pub use pattern::*;
pub use registry::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, routes};
    use proptest::prelude::*;

    #[test]
    fn flatten_nested_students_module() {
        let map = routes! {
            "students" => {
                "list" => "L",
                "list/{amt}" => "L",
            },
        };
        let table = RouteRegistry::new()
            .contribute("students", map)
            .unwrap()
            .build()
            .unwrap();

        let paths: Vec<_> = table.paths().collect();
        assert_eq!(paths, vec!["/students/list", "/students/list/{amt}"]);
        assert_eq!(table.get("/students/list"), Some(&"L"));
        assert_eq!(table.get("/students/list/{amt}"), Some(&"L"));
    }

    #[test]
    fn leading_slashes_are_not_duplicated() {
        let map = RouteMap::new()
            .route("/login", 1)
            .nest("/settings", RouteMap::new().route("/edit-profile", 2))
            .route("/", 3);
        assert_eq!(
            flatten(map),
            vec![
                ("/login".to_string(), 1),
                ("/settings/edit-profile".to_string(), 2),
                ("/".to_string(), 3),
            ]
        );
    }

    #[test]
    fn trailing_slashes_are_kept() {
        let map = routes! {
            "students" => {
                "list/" => 1,
                "list" => 2,
            },
            "/" => 3,
        };
        let table = RouteRegistry::new()
            .contribute("students", map)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(table.get("/students/list/"), Some(&1));
        assert_eq!(table.get("/students/list"), Some(&2));
        assert_eq!(table.get("/"), Some(&3));
    }

    #[test]
    fn parameters_are_opaque_to_flattening() {
        let map = routes! {
            "grades" => {
                "student-report" => {
                    "{student_id:[1-9][0-9]*}" => 'a',
                    "school-term-{school_term:[1-9][0-9]*}/{student_id:[1-9][0-9]*}" => 'b',
                },
            },
        };
        let paths: Vec<_> = flatten(map).into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec![
                "/grades/student-report/{student_id:[1-9][0-9]*}",
                "/grades/student-report/school-term-{school_term:[1-9][0-9]*}/{student_id:[1-9][0-9]*}",
            ]
        );
    }

    #[test]
    fn collision_across_modules_names_both() {
        let err = RouteRegistry::new()
            .contribute("students", routes! { "students" => { "list" => 1 } })
            .unwrap()
            .contribute("teachers", routes! { "students/list" => 2 })
            .unwrap()
            .build()
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        let message = err.to_string();
        assert!(message.contains("/students/list"));
        assert!(message.contains("students"));
        assert!(message.contains("teachers"));
    }

    #[test]
    fn collision_within_one_module_is_rejected() {
        let map = routes! {
            "a" => { "b" => 1 },
            "a/b" => 2,
        };
        let err = RouteRegistry::new()
            .contribute("module", map)
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn malformed_contributions_name_the_module() {
        let empty: RouteMap<u8> = RouteMap::new();
        let err = RouteRegistry::new().contribute("files", empty).unwrap_err();
        assert!(err.to_string().contains("files"));

        let nested_empty = RouteMap::new().nest("projects", RouteMap::<u8>::new());
        let err = RouteRegistry::new()
            .contribute("projects", nested_empty)
            .unwrap_err();
        assert!(err.to_string().contains("projects"));

        let err = RouteRegistry::new()
            .contribute("users", RouteMap::new().route("", 1))
            .unwrap_err();
        assert!(err.to_string().contains("users"));

        let err = RouteRegistry::new()
            .contribute("users", RouteMap::new().route("login", 1).route("login", 2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn table_remembers_declaring_module() {
        let table = RouteRegistry::new()
            .contribute("users", routes! { "login" => 1, "register" => 2 })
            .unwrap()
            .contribute("files", routes! { "download-file/{file_id:[1-9][0-9]*}" => 3 })
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.module_of("/register"), Some("users"));
        assert_eq!(
            table.module_of("/download-file/{file_id:[1-9][0-9]*}"),
            Some("files")
        );
    }

    fn nested(segments: &[String], handler: u32) -> RouteMap<u32> {
        let (last, rest) = segments.split_last().expect("at least one segment");
        rest.iter()
            .rev()
            .fold(RouteMap::new().route(last.clone(), handler), |map, segment| {
                RouteMap::new().nest(segment.clone(), map)
            })
    }

    proptest! {
        #[test]
        fn flatten_is_associative_over_nesting(
            segments in prop::collection::vec("[a-z][a-z0-9-]{0,6}", 1..5),
            split in 0usize..5,
            handler in any::<u32>(),
        ) {
            let split = split.min(segments.len() - 1);
            let deep = flatten(nested(&segments, handler));

            let mut grouped = segments[..split].to_vec();
            grouped.push(segments[split..].join("/"));
            let shallow = flatten(nested(&grouped, handler));

            let flat = flatten(RouteMap::new().route(segments.join("/"), handler));

            prop_assert_eq!(&deep, &shallow);
            prop_assert_eq!(&deep, &flat);
            prop_assert_eq!(deep.len(), 1);
            prop_assert_eq!(&deep[0].0, &format!("/{}", segments.join("/")));
        }
    }
}
