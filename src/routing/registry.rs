use {
    super::{RouteMap, RouteNode},
    crate::{Error, Result},
    std::collections::{BTreeMap, BTreeSet},
};

/// Joins a parent path and a segment with exactly one `/` between them. A
/// trailing slash on the segment is kept.
fn join(prefix: &str, segment: &str) -> String {
    let segment = segment.trim_start_matches('/');
    if segment.is_empty() {
        return prefix.to_string();
    }
    if prefix.ends_with('/') {
        format!("{prefix}{segment}")
    } else {
        format!("{prefix}/{segment}")
    }
}

/// Flattens a nested declaration into `(full path, handler)` pairs in
/// declaration order. A segment of just `/` names its parent path, so a
/// top-level `"/"` key declares the site root.
///
/// ```
/// use campus_gate::routing::{RouteMap, flatten};
///
/// let map = RouteMap::new().nest("a", RouteMap::new().nest("b", RouteMap::new().route("c", 'H')));
/// assert_eq!(flatten(map), vec![("/a/b/c".to_string(), 'H')]);
/// ```
pub fn flatten<H>(map: RouteMap<H>) -> Vec<(String, H)> {
    let mut out = Vec::new();
    flatten_into("/", map, &mut out);
    out
}

fn flatten_into<H>(prefix: &str, map: RouteMap<H>, out: &mut Vec<(String, H)>) {
    for (segment, node) in map.into_entries() {
        let path = join(prefix, &segment);
        match node {
            RouteNode::Leaf(handler) => out.push((path, handler)),
            RouteNode::Branch(inner) => flatten_into(&path, inner, out),
        }
    }
}

/// Checks the shape of one module's declaration: no empty maps, no empty
/// segment keys, no duplicate keys within one level.
fn check_shape<H>(module: &str, map: &RouteMap<H>, at: &str) -> Result<()> {
    if map.is_empty() {
        return Err(Error::config(format!(
            "module '{module}' declares an empty route map at '{at}'"
        )));
    }
    let mut seen = BTreeSet::new();
    for (segment, node) in map.iter() {
        if segment.trim().is_empty() {
            return Err(Error::config(format!(
                "module '{module}' declares an empty segment under '{at}'"
            )));
        }
        if !seen.insert(segment) {
            return Err(Error::config(format!(
                "module '{module}' declares segment '{segment}' twice under '{at}'"
            )));
        }
        if let RouteNode::Branch(inner) = node {
            check_shape(module, inner, &join(at, segment))?;
        }
    }
    Ok(())
}

/// Collects route declarations from feature modules.
///
/// ```
/// use campus_gate::routing::{RouteMap, RouteRegistry};
///
/// let table = RouteRegistry::new()
///     .contribute("users", RouteMap::new().route("login", "login"))?
///     .contribute("students", RouteMap::new().nest("students", RouteMap::new().route("list", "list")))?
///     .build()?;
/// assert_eq!(table.get("/students/list"), Some(&"list"));
/// # Ok::<(), campus_gate::Error>(())
/// ```
#[derive(Debug)]
pub struct RouteRegistry<H> {
    contributions: Vec<(String, RouteMap<H>)>,
}

impl<H> Default for RouteRegistry<H> {
    fn default() -> Self {
        Self {
            contributions: Vec::new(),
        }
    }
}

impl<H> RouteRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one module's declaration after checking its shape.
    pub fn contribute(mut self, module: impl Into<String>, map: RouteMap<H>) -> Result<Self> {
        let module = module.into();
        check_shape(&module, &map, "/")?;
        tracing::debug!(module = %module, entries = map.len(), "route map contributed");
        self.contributions.push((module, map));
        Ok(self)
    }

    /// Names of the modules contributed so far, in order.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.contributions.iter().map(|(m, _)| m.as_str())
    }

    /// Flattens every contribution into one table. Two declarations producing
    /// the same path fail, naming both modules.
    pub fn build(self) -> Result<DispatchTable<H>> {
        let mut routes: BTreeMap<String, Dispatch<H>> = BTreeMap::new();

        for (module, map) in self.contributions {
            for (path, handler) in flatten(map) {
                if let Some(existing) = routes.get(&path) {
                    return Err(Error::config(format!(
                        "route '{path}' is declared by module '{}' and by module '{module}'",
                        existing.module
                    )));
                }
                routes.insert(
                    path,
                    Dispatch {
                        module: module.clone(),
                        handler,
                    },
                );
            }
        }

        Ok(DispatchTable { routes })
    }
}

#[derive(Debug, Clone)]
struct Dispatch<H> {
    module: String,
    handler: H,
}

/// Full path pattern to handler, with unique keys.
#[derive(Debug, Clone)]
pub struct DispatchTable<H> {
    routes: BTreeMap<String, Dispatch<H>>,
}

impl<H> DispatchTable<H> {
    pub fn get(&self, path: &str) -> Option<&H> {
        self.routes.get(path).map(|d| &d.handler)
    }

    /// Module that declared `path`.
    pub fn module_of(&self, path: &str) -> Option<&str> {
        self.routes.get(path).map(|d| d.module.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// `(path, module, handler)` in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &H)> {
        self.routes
            .iter()
            .map(|(p, d)| (p.as_str(), d.module.as_str(), &d.handler))
    }

    pub fn into_routes(self) -> impl Iterator<Item = (String, String, H)> {
        self.routes
            .into_iter()
            .map(|(p, d)| (p, d.module, d.handler))
    }
}
