//! Recursive `$ref` resolution
//!
//! Resolution runs in two phases:
//!
//! 1. **Gather** - fetch and parse the requested document, scan it for
//!    `$ref` ids, then fan out concurrent fetches for every id not yet
//!    retrieved, repeating until no new references appear. The join is
//!    all-or-nothing: one failed fetch fails the whole resolution. Raw
//!    documents are cached per resolver by address, so a ref shared across
//!    the call tree is fetched once.
//! 2. **Link** - allocate one cell per gathered document, then build each
//!    body exactly once, splicing every `$ref` object into a shared link to
//!    its target. Because each document links once, diamonds share a single
//!    resolved instance and cycles terminate as back-edges.
//!
//! The gathered registry always contains the currently-resolving document
//! before any descent, so self-references need no special casing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::Value;
use tokio::sync::Mutex;

use super::document::{SchemaCell, SchemaNode, SharedSchema};
use super::error::SchemaError;
use super::fetch::{DocumentFetcher, HttpFetcher, IdentityFormatter, NameFormatter};

/// Resolves schema documents and the full graph of documents they reference.
pub struct SchemaResolver {
    fetcher: Arc<dyn DocumentFetcher>,
    formatter: Arc<dyn NameFormatter>,
    /// Parsed documents keyed by fetch address, shared across resolve calls.
    raw_cache: Mutex<HashMap<String, Value>>,
}

impl SchemaResolver {
    /// Resolver with the default HTTP fetcher and identity id formatting.
    pub fn new() -> Self {
        Self::with_fetcher(Arc::new(HttpFetcher::new()))
    }

    /// Resolver with a custom transport and identity id formatting.
    pub fn with_fetcher(fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self {
            fetcher,
            formatter: Arc::new(IdentityFormatter),
            raw_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the id formatter.
    pub fn with_formatter(mut self, formatter: Arc<dyn NameFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Resolve the document named `id` and every document it transitively
    /// references, returning the fully spliced root.
    pub async fn resolve(&self, id: &str) -> Result<SharedSchema, SchemaError> {
        let (root_key, registry) = self.gather(id).await?;
        link(&root_key, &registry)
    }

    /// Breadth-first reference gathering with concurrent fan-out per level.
    async fn gather(
        &self,
        root: &str,
    ) -> Result<(String, HashMap<String, Value>), SchemaError> {
        let mut registry: HashMap<String, Value> = HashMap::new();
        let mut requested: HashSet<String> = HashSet::new();
        let mut root_key = root.to_string();

        requested.insert(root.to_string());
        let mut frontier = vec![root.to_string()];

        while !frontier.is_empty() {
            let batch = frontier
                .drain(..)
                .map(|name| self.fetch_document(name));
            let fetched = try_join_all(batch).await?;

            let mut next = Vec::new();
            for (name, doc) in fetched {
                // Register under the document's declared id when it has
                // one, since that is what $ref values point at.
                let key = doc
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or(&name)
                    .to_string();
                if name == root {
                    root_key = key.clone();
                }

                let mut refs = HashSet::new();
                collect_refs(&doc, &name, &mut refs);
                registry.insert(key, doc);

                for target in refs {
                    if !requested.contains(&target) && !registry.contains_key(&target) {
                        requested.insert(target.clone());
                        next.push(target);
                    }
                }
            }
            frontier = next;
        }

        Ok((root_key, registry))
    }

    /// Fetch and parse one document, consulting the address cache first.
    async fn fetch_document(&self, id: String) -> Result<(String, Value), SchemaError> {
        let address = self.formatter.format(&id);

        {
            let cache = self.raw_cache.lock().await;
            if let Some(doc) = cache.get(&address) {
                return Ok((id, doc.clone()));
            }
        }

        let text = self.fetcher.fetch(&address).await?;
        let doc: Value = serde_json::from_str(&text).map_err(|e| SchemaError::Parse {
            id: id.clone(),
            source: e,
        })?;

        let mut cache = self.raw_cache.lock().await;
        cache.insert(address, doc.clone());
        Ok((id, doc))
    }
}

impl Default for SchemaResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively collect every `$ref` value in `doc` into `refs`, skipping
/// references a document makes to its own requested name. Duplicates
/// collapse in the set, so each unique id is fetched at most once.
fn collect_refs(doc: &Value, own_name: &str, refs: &mut HashSet<String>) {
    match doc {
        Value::Object(members) => {
            for (key, value) in members {
                match (key.as_str(), value) {
                    ("$ref", Value::String(target)) if target != own_name => {
                        refs.insert(target.clone());
                    }
                    _ => collect_refs(value, own_name, refs),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, own_name, refs);
            }
        }
        _ => {}
    }
}

/// Link phase: one cell per registry entry, each body built exactly once.
fn link(
    root_key: &str,
    registry: &HashMap<String, Value>,
) -> Result<SharedSchema, SchemaError> {
    let cells: HashMap<String, SharedSchema> = registry
        .keys()
        .map(|id| (id.clone(), SchemaCell::new(id.clone())))
        .collect();

    for (id, raw) in registry {
        let body = build_node(raw, id, &cells)?;
        cells[id].fill(body);
    }

    Ok(Arc::clone(&cells[root_key]))
}

/// Convert one raw value into a resolved node, splicing `$ref` objects into
/// links. An object carrying a string `$ref` is replaced wholesale by the
/// target document; a ref whose target was never gathered is fatal.
fn build_node(
    value: &Value,
    owner: &str,
    cells: &HashMap<String, SharedSchema>,
) -> Result<SchemaNode, SchemaError> {
    match value {
        Value::Null => Ok(SchemaNode::Null),
        Value::Bool(b) => Ok(SchemaNode::Bool(*b)),
        Value::Number(n) => Ok(SchemaNode::Number(n.clone())),
        Value::String(s) => Ok(SchemaNode::String(s.clone())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(build_node(item, owner, cells)?);
            }
            Ok(SchemaNode::Array(out))
        }
        Value::Object(members) => {
            if let Some(target) = members.get("$ref").and_then(Value::as_str) {
                let cell = cells.get(target).ok_or_else(|| {
                    SchemaError::UnresolvedReference {
                        id: owner.to_string(),
                        reference: target.to_string(),
                    }
                })?;
                return Ok(SchemaNode::Ref(Arc::clone(cell)));
            }

            let mut out = BTreeMap::new();
            for (key, member) in members {
                out.insert(key.clone(), build_node(member, owner, cells)?);
            }
            Ok(SchemaNode::Object(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fetch::{BaseAddressFormatter, StaticFetcher};
    use serde_json::json;

    fn resolver_for(docs: &[(&str, Value)]) -> (SchemaResolver, Arc<StaticFetcher>) {
        let mut fetcher = StaticFetcher::new();
        for (address, doc) in docs {
            fetcher.insert(*address, doc.to_string());
        }
        let fetcher = Arc::new(fetcher);
        (
            SchemaResolver::with_fetcher(Arc::clone(&fetcher) as Arc<dyn DocumentFetcher>),
            fetcher,
        )
    }

    /// Walk object members, reading through spliced links.
    fn member<'a>(node: &'a SchemaNode, path: &[&str]) -> &'a SchemaNode {
        path.iter().fold(node, |n, key| n.get(key).expect(key))
    }

    #[tokio::test]
    async fn splices_a_single_reference() {
        let (resolver, _) = resolver_for(&[
            ("A", json!({"id": "A", "properties": {"b": {"$ref": "B"}}})),
            ("B", json!({"id": "B", "value": 1})),
        ]);

        let schema = resolver.resolve("A").await.unwrap();
        assert_eq!(schema.id(), "A");
        assert_eq!(
            schema.to_value().unwrap(),
            json!({"id": "A", "properties": {"b": {"id": "B", "value": 1}}})
        );
    }

    #[tokio::test]
    async fn resolves_nested_references_several_levels_deep() {
        let (resolver, _) = resolver_for(&[
            (
                "Schema1",
                json!({
                    "id": "Schema1",
                    "properties": {
                        "subobject": {"$ref": "Subobject1"},
                        "subobject2": {"$ref": "Subobject2"}
                    }
                }),
            ),
            (
                "Subobject1",
                json!({
                    "id": "Subobject1",
                    "properties": {"recursive": {"$ref": "Subobject1"}}
                }),
            ),
            (
                "Subobject2",
                json!({
                    "id": "Subobject2",
                    "properties": {
                        "recursiveArray": {"items": {"$ref": "SubSubobject1"}}
                    }
                }),
            ),
            (
                "SubSubobject1",
                json!({
                    "id": "SubSubobject1",
                    "properties": {"recursive": {"$ref": "SubSubobject1"}}
                }),
            ),
        ]);

        let schema = resolver.resolve("Schema1").await.unwrap();
        let root = schema.body();

        assert_eq!(member(root, &["id"]).as_str(), Some("Schema1"));
        assert_eq!(
            member(root, &["properties", "subobject", "id"]).as_str(),
            Some("Subobject1")
        );
        assert_eq!(
            member(
                root,
                &["properties", "subobject", "properties", "recursive", "id"]
            )
            .as_str(),
            Some("Subobject1")
        );
        assert_eq!(
            member(
                root,
                &["properties", "subobject2", "properties", "recursiveArray", "items", "id"]
            )
            .as_str(),
            Some("SubSubobject1")
        );
    }

    #[tokio::test]
    async fn duplicate_references_fetch_once() {
        let (resolver, fetcher) = resolver_for(&[
            (
                "A",
                json!({
                    "id": "A",
                    "first": {"$ref": "B"},
                    "second": {"$ref": "B"},
                    "nested": [{"deep": {"$ref": "B"}}]
                }),
            ),
            ("B", json!({"id": "B", "value": 2})),
        ]);

        resolver.resolve("A").await.unwrap();
        assert_eq!(fetcher.hits("B"), 1);
    }

    #[tokio::test]
    async fn diamond_branches_share_one_resolved_instance() {
        let (resolver, _) = resolver_for(&[
            (
                "Root",
                json!({"id": "Root", "a": {"$ref": "D"}, "b": {"$ref": "D"}}),
            ),
            ("D", json!({"id": "D", "value": 3})),
        ]);

        let schema = resolver.resolve("Root").await.unwrap();
        let a = schema.body().get("a").and_then(SchemaNode::as_link).unwrap();
        let b = schema.body().get("b").and_then(SchemaNode::as_link).unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[tokio::test]
    async fn mutual_cycle_terminates_as_back_edge() {
        let (resolver, fetcher) = resolver_for(&[
            ("A", json!({"id": "A", "b": {"$ref": "B"}})),
            ("B", json!({"id": "B", "a": {"$ref": "A"}})),
        ]);

        let schema = resolver.resolve("A").await.unwrap();
        assert_eq!(fetcher.hits("A"), 1);
        assert_eq!(fetcher.hits("B"), 1);

        let b = schema.body().get("b").and_then(SchemaNode::as_link).unwrap();
        let back = b.body().get("a").and_then(SchemaNode::as_link).unwrap();
        assert!(Arc::ptr_eq(back, &schema));

        // A cyclic graph has no flat JSON form.
        assert!(matches!(
            schema.to_value(),
            Err(SchemaError::CyclicDocument { .. })
        ));
    }

    #[tokio::test]
    async fn self_reference_does_not_refetch() {
        let (resolver, fetcher) = resolver_for(&[(
            "S",
            json!({"id": "S", "again": {"$ref": "S"}}),
        )]);

        let schema = resolver.resolve("S").await.unwrap();
        assert_eq!(fetcher.hits("S"), 1);

        let back = schema
            .body()
            .get("again")
            .and_then(SchemaNode::as_link)
            .unwrap();
        assert!(Arc::ptr_eq(back, &schema));
    }

    #[tokio::test]
    async fn unknown_reference_is_fatal() {
        let (resolver, _) = resolver_for(&[(
            "A",
            json!({"id": "A", "b": {"$ref": "Nowhere"}}),
        )]);

        // "Nowhere" is fetched (and fails) during gather, which surfaces as
        // a fetch error; a ref that dodges gathering but misses the registry
        // is covered below.
        assert!(matches!(
            resolver.resolve("A").await,
            Err(SchemaError::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn reference_missing_from_registry_is_unresolved() {
        // The target parses but declares a different id than the one it was
        // requested under, so the ref never finds it.
        let (resolver, _) = resolver_for(&[
            ("A", json!({"id": "A", "b": {"$ref": "B"}})),
            ("B", json!({"id": "NotB", "b": {"$ref": "A"}})),
        ]);

        let err = resolver.resolve("A").await.unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnresolvedReference { ref reference, .. } if reference == "B"
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert("A", "{not json");
        let resolver = SchemaResolver::with_fetcher(Arc::new(fetcher));

        assert!(matches!(
            resolver.resolve("A").await,
            Err(SchemaError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn repeated_resolves_reuse_the_address_cache() {
        let (resolver, fetcher) = resolver_for(&[
            ("A", json!({"id": "A", "b": {"$ref": "B"}})),
            ("B", json!({"id": "B"})),
        ]);

        resolver.resolve("A").await.unwrap();
        resolver.resolve("A").await.unwrap();
        assert_eq!(fetcher.hits("A"), 1);
        assert_eq!(fetcher.hits("B"), 1);
    }

    #[tokio::test]
    async fn formatter_maps_ids_to_addresses() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert("/schemas/A", json!({"id": "A"}).to_string());
        let resolver = SchemaResolver::with_fetcher(Arc::new(fetcher))
            .with_formatter(Arc::new(BaseAddressFormatter::new("/schemas/")));

        let schema = resolver.resolve("A").await.unwrap();
        assert_eq!(schema.id(), "A");
    }
}
