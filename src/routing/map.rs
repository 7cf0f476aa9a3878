/// A node of a route declaration: either a nested map or a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteNode<H> {
    Branch(RouteMap<H>),
    Leaf(H),
}

/// A nested route declaration contributed by a feature module.
///
/// Keys are path segments, possibly containing several `/`-separated parts
/// and inline parameters such as `{id:[1-9][0-9]*}`. Declaration order is
/// kept.
///
/// ```
/// use campus_gate::routing::RouteMap;
///
/// let students = RouteMap::new()
///     .route("list", "list students")
///     .route("list/{display_amount:(?:10|25|all)}", "list students");
/// let module = RouteMap::new().nest("students", students);
/// assert_eq!(module.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMap<H> {
    entries: Vec<(String, RouteNode<H>)>,
}

impl<H> Default for RouteMap<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H> RouteMap<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler under `segment`.
    #[must_use]
    pub fn route(mut self, segment: impl Into<String>, handler: H) -> Self {
        self.entries.push((segment.into(), RouteNode::Leaf(handler)));
        self
    }

    /// Adds a nested map under `segment`.
    #[must_use]
    pub fn nest(mut self, segment: impl Into<String>, map: RouteMap<H>) -> Self {
        self.entries.push((segment.into(), RouteNode::Branch(map)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RouteNode<H>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn into_entries(self) -> Vec<(String, RouteNode<H>)> {
        self.entries
    }
}

/// Builds a [`RouteMap`] from a nested literal.
///
/// A `{ ... }` value nests a map; any other expression is a handler.
///
/// ```
/// use campus_gate::routes;
///
/// let map = routes! {
///     "students" => {
///         "list" => 1,
///         "list/{display_amount:(?:10|25|all)}" => 2,
///     },
///     "profile/{_user_id:[0-9]+}" => 3,
/// };
/// assert_eq!(map.len(), 2);
/// ```
#[macro_export]
macro_rules! routes {
    (@entries $map:expr;) => { $map };
    (@entries $map:expr; $segment:expr => { $($inner:tt)* } $(, $($rest:tt)*)?) => {
        $crate::routes!(@entries $map.nest($segment, $crate::routes!($($inner)*)); $($($rest)*)?)
    };
    (@entries $map:expr; $segment:expr => $handler:expr $(, $($rest:tt)*)?) => {
        $crate::routes!(@entries $map.route($segment, $handler); $($($rest)*)?)
    };
    ($($body:tt)*) => {
        $crate::routes!(@entries $crate::routing::RouteMap::new(); $($body)*)
    };
}
