//! Foreign-key graph discovery.
//!
//! Starting from a seed table, [`DependencyResolver`] walks foreign keys in the
//! requested direction(s) with an explicit worklist, never leaving the schema
//! scope, and records two relations:
//!
//! - the neighbor map: which tables were reached from which table
//! - the dependency relation: referencing table depends on referenced table
//!
//! The final order always comes from the dependency relation, so a table is
//! created before every table that references it, whichever direction it was
//! discovered in.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::core::{
    Catalog, FkDirection, Key, ReferencedByOptions, SchemaScope, ShallowTable, TableConfiguration,
};
use crate::error::Result;

use super::topo::{topological_sort, CyclePolicy};

/// Tables discovered from one or more seeds, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    tables: Vec<ShallowTable>,
    neighbors: HashMap<ShallowTable, Vec<ShallowTable>>,
    depends_on: HashMap<ShallowTable, Vec<ShallowTable>>,
}

impl DependencyGraph {
    /// Graph holding a single table and no edges.
    pub fn single(table: ShallowTable) -> Self {
        let mut graph = Self::default();
        graph.insert(table);
        graph
    }

    /// Discovered tables in discovery order.
    pub fn tables(&self) -> &[ShallowTable] {
        &self.tables
    }

    pub fn contains(&self, table: &ShallowTable) -> bool {
        self.neighbors.contains_key(table)
    }

    /// Tables reached from `table`. For a seed this is every table discovered from it.
    pub fn neighbors(&self, table: &ShallowTable) -> &[ShallowTable] {
        self.neighbors.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Tables that `table` references, restricted to the graph.
    pub fn dependencies<'a>(
        &'a self,
        table: &ShallowTable,
    ) -> impl Iterator<Item = &'a ShallowTable> + 'a {
        self.depends_on
            .get(table)
            .into_iter()
            .flatten()
            .filter(move |dep| self.contains(dep))
    }

    /// Add a table; returns false if it was already present.
    fn insert(&mut self, table: ShallowTable) -> bool {
        if self.neighbors.contains_key(&table) {
            return false;
        }
        self.neighbors.insert(table.clone(), Vec::new());
        self.tables.push(table);
        true
    }

    fn add_neighbor(&mut self, table: &ShallowTable, neighbor: ShallowTable) {
        let entry = self.neighbors.entry(table.clone()).or_default();
        if !entry.contains(&neighbor) {
            entry.push(neighbor);
        }
    }

    fn add_dependency(&mut self, key: &Key) {
        let Some(referenced) = key.foreign_table() else {
            return;
        };
        if key.is_self_reference() {
            return;
        }
        let entry = self.depends_on.entry(key.table.clone()).or_default();
        if !entry.contains(referenced) {
            entry.push(referenced.clone());
        }
    }

    /// Union with `other`. Tables already present keep their position.
    pub fn merge(&mut self, other: DependencyGraph) {
        let DependencyGraph {
            tables,
            mut neighbors,
            depends_on,
        } = other;

        for table in tables {
            let reached = neighbors.remove(&table).unwrap_or_default();
            self.insert(table.clone());
            for neighbor in reached {
                self.add_neighbor(&table, neighbor);
            }
        }
        for (table, deps) in depends_on {
            let entry = self.depends_on.entry(table).or_default();
            for dep in deps {
                if !entry.contains(&dep) {
                    entry.push(dep);
                }
            }
        }
    }

    /// Tables ordered so every table follows the tables it references.
    pub fn order(&self, policy: CyclePolicy) -> Result<Vec<ShallowTable>> {
        topological_sort(
            &self.tables,
            |table| self.dependencies(table).cloned().collect::<Vec<_>>(),
            policy,
        )
    }
}

/// Walks the foreign-key graph of one catalog within a schema scope.
pub struct DependencyResolver<'a> {
    catalog: &'a dyn Catalog,
    scope: &'a SchemaScope,
    cycles: CyclePolicy,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a dyn Catalog, scope: &'a SchemaScope) -> Self {
        Self {
            catalog,
            scope,
            cycles: CyclePolicy::default(),
        }
    }

    pub fn with_cycle_policy(mut self, cycles: CyclePolicy) -> Self {
        self.cycles = cycles;
        self
    }

    /// Discover every table reachable from `seed` under `options`.
    pub async fn discover(
        &self,
        seed: &ShallowTable,
        options: ReferencedByOptions,
    ) -> Result<DependencyGraph> {
        if options.is_disabled() {
            return Ok(DependencyGraph::single(seed.clone()));
        }
        options.validate()?;

        debug!("Resolving tables linked to {} ({})", seed, options);

        let mut graph = DependencyGraph::single(seed.clone());
        let mut worklist = VecDeque::from([seed.clone()]);

        while let Some(table) = worklist.pop_front() {
            let (descending, ascending) = self.foreign_keys(&table, options).await?;

            let candidates = descending
                .iter()
                .filter_map(|key| key.foreign_table().map(|t| (key, t)))
                .chain(ascending.iter().map(|key| (key, &key.table)));

            for (key, neighbor) in candidates {
                if key.is_self_reference() {
                    continue;
                }
                if !self.scope.contains(&neighbor.schema) {
                    debug!("{} is outside the schema scope, skipping", neighbor);
                    continue;
                }

                graph.add_neighbor(&table, neighbor.clone());

                if options.schema && !neighbor.in_schema(&table.schema) {
                    debug!(
                        "Not following {} -> {} (schema restricted to {})",
                        table, neighbor, table.schema
                    );
                    continue;
                }

                graph.add_dependency(key);
                if graph.insert(neighbor.clone()) {
                    worklist.push_back(neighbor.clone());
                }
            }
        }

        let discovered: Vec<ShallowTable> = graph.tables[1..].to_vec();
        for table in discovered {
            graph.add_neighbor(seed, table);
        }

        debug!("Found {} table(s) linked to {}", graph.tables.len() - 1, seed);
        Ok(graph)
    }

    async fn foreign_keys(
        &self,
        table: &ShallowTable,
        options: ReferencedByOptions,
    ) -> Result<(Vec<Key>, Vec<Key>)> {
        match (options.descending, options.ascending) {
            (true, true) => self.catalog.list_all_foreign_keys(table, self.scope).await,
            (true, false) => Ok((
                self.catalog
                    .list_foreign_keys(table, FkDirection::Descending, self.scope)
                    .await?,
                Vec::new(),
            )),
            (false, true) => Ok((
                Vec::new(),
                self.catalog
                    .list_foreign_keys(table, FkDirection::Ascending, self.scope)
                    .await?,
            )),
            (false, false) => Ok((Vec::new(), Vec::new())),
        }
    }

    /// Ordered tables reachable from one seed, the seed included.
    pub async fn resolve(
        &self,
        seed: &ShallowTable,
        options: ReferencedByOptions,
    ) -> Result<Vec<ShallowTable>> {
        self.discover(seed, options).await?.order(self.cycles)
    }

    /// Union of every configured seed's tables in one dependency order.
    pub async fn resolve_all(&self, configs: &[TableConfiguration]) -> Result<Vec<ShallowTable>> {
        let mut graph = DependencyGraph::default();
        let mut seen: HashSet<&TableConfiguration> = HashSet::new();

        for config in configs {
            if !seen.insert(config) {
                continue;
            }
            graph.merge(self.discover(&config.table, config.referenced_by).await?);
        }

        let ordered = graph.order(self.cycles)?;
        info!(
            "Resolved {} table(s) from {} configured table(s)",
            ordered.len(),
            configs.len()
        );
        Ok(ordered)
    }
}

/// Ordered tables reachable from `seed` under `options` within `scope`.
pub async fn resolve_referenced_tables(
    catalog: &dyn Catalog,
    seed: &ShallowTable,
    options: ReferencedByOptions,
    scope: &SchemaScope,
) -> Result<Vec<ShallowTable>> {
    DependencyResolver::new(catalog, scope)
        .resolve(seed, options)
        .await
}

/// Replace `*` schemas with every same-named table in the scope.
///
/// Matches are sorted by schema then name and inherit the configured options.
pub async fn expand_wildcards(
    catalog: &dyn Catalog,
    configs: &[TableConfiguration],
    scope: &SchemaScope,
) -> Result<Vec<TableConfiguration>> {
    if !configs.iter().any(|c| c.table.schema == "*") {
        return Ok(configs.to_vec());
    }

    let mut available = catalog.list_tables(scope).await?;
    available.sort_by_key(|t| (t.schema.to_lowercase(), t.name.to_lowercase()));

    let mut expanded = Vec::with_capacity(configs.len());
    for config in configs {
        if config.table.schema != "*" {
            expanded.push(config.clone());
            continue;
        }

        let before = expanded.len();
        expanded.extend(
            available
                .iter()
                .filter(|t| crate::core::identifier::eq_ignore_case(&t.name, &config.table.name))
                .map(|t| TableConfiguration::new(t.clone(), config.referenced_by)),
        );
        debug!(
            "Expanded *.{} to {} table(s)",
            config.table.name,
            expanded.len() - before
        );
    }
    Ok(expanded)
}
