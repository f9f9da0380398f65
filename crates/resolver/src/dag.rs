//! The dependency DAG
//!
//! Nodes are owned by flat arenas and addressed by stable indices, so a
//! version can point down to packages while packages point back up at
//! versions without reference cycles. Cycles are structurally impossible:
//! the graph is built top-down with a visited set keyed on version-node
//! identity.
//!
//! - [`DepDag::prepare`] discovers packages and versions top-down from a
//!   root recipe.
//! - [`DepDag::filter`] runs the bottom-up fixed point removing versions
//!   no group of upstream constraints can accept.
//! - [`DepDag::resolve`] pins one version per package top-down.
//! - [`DepDag::collect_languages`] propagates language requirements
//!   bottom-up over the resolved graph.

use crate::Heuristics;
use dop_errors::{Error, ResolveError};
use dop_profile::Profile;
use dop_recipe::Recipe;
use dop_repo::PackRepo;
use dop_types::{language, Language, Version, VersionSpec};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Index of a package node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackId(pub(crate) usize);

/// Index of a version node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EdgeId(usize);

#[derive(Debug)]
struct PackNode {
    name: String,
    /// Every version known for this package, sorted ascending, unique
    all_versions: Vec<Version>,
    /// Versions with a node, in creation order
    considered: Vec<VerId>,
    resolved: Option<VerId>,
    /// Edges pointing at this package
    up_edges: Vec<EdgeId>,
}

#[derive(Debug)]
struct VerNode {
    pack: PackId,
    version: Version,
    revision: Option<String>,
    langs: Vec<Language>,
    down_edges: Vec<EdgeId>,
    removed: bool,
}

#[derive(Debug)]
struct EdgeNode {
    up: VerId,
    down: PackId,
    spec: VersionSpec,
    removed: bool,
}

/// The dependency DAG of one root recipe
#[derive(Debug)]
pub struct DepDag {
    heuristics: Heuristics,
    packs: Vec<PackNode>,
    vers: Vec<VerNode>,
    edges: Vec<EdgeNode>,
    by_name: HashMap<String, PackId>,
}

impl DepDag {
    pub(crate) fn empty(heuristics: Heuristics) -> Self {
        Self {
            heuristics,
            packs: Vec::new(),
            vers: Vec::new(),
            edges: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    // ---- construction primitives, shared with the lock-file parser ----

    pub(crate) fn create_pack(&mut self, name: &str) -> PackId {
        let id = PackId(self.packs.len());
        self.packs.push(PackNode {
            name: name.to_string(),
            all_versions: Vec::new(),
            considered: Vec::new(),
            resolved: None,
            up_edges: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub(crate) fn push_version(&mut self, pack: PackId, version: Version) {
        self.packs[pack.0].all_versions.push(version);
    }

    fn merge_versions(&mut self, pack: PackId, versions: Vec<Version>) {
        let all = &mut self.packs[pack.0].all_versions;
        all.extend(versions);
        all.sort_unstable();
        all.dedup();
    }

    pub(crate) fn create_version(&mut self, pack: PackId, version: Version) -> VerId {
        let id = VerId(self.vers.len());
        self.vers.push(VerNode {
            pack,
            version,
            revision: None,
            langs: Vec::new(),
            down_edges: Vec::new(),
            removed: false,
        });
        self.packs[pack.0].considered.push(id);
        id
    }

    fn get_or_create_version(&mut self, pack: PackId, version: &Version) -> (VerId, bool) {
        if let Some(existing) = self.node_of(pack, version) {
            return (existing, false);
        }
        (self.create_version(pack, version.clone()), true)
    }

    pub(crate) fn add_edge(&mut self, up: VerId, down: PackId, spec: VersionSpec) {
        let id = EdgeId(self.edges.len());
        self.edges.push(EdgeNode {
            up,
            down,
            spec,
            removed: false,
        });
        self.vers[up.0].down_edges.push(id);
        self.packs[down.0].up_edges.push(id);
    }

    pub(crate) fn set_revision(&mut self, ver: VerId, revision: String) {
        self.vers[ver.0].revision = Some(revision);
    }

    pub(crate) fn set_langs(&mut self, ver: VerId, langs: Vec<Language>) {
        self.vers[ver.0].langs = langs;
    }

    pub(crate) fn set_resolved(&mut self, pack: PackId, ver: VerId) {
        self.packs[pack.0].resolved = Some(ver);
    }

    // ---- read access ----

    #[must_use]
    pub fn heuristics(&self) -> Heuristics {
        self.heuristics
    }

    /// The root package (the recipe the DAG was prepared from)
    #[must_use]
    pub fn root(&self) -> PackId {
        PackId(0)
    }

    /// Packages in discovery order
    pub fn packs(&self) -> impl Iterator<Item = PackId> {
        (0..self.packs.len()).map(PackId)
    }

    #[must_use]
    pub fn pack_by_name(&self, name: &str) -> Option<PackId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn pack_name(&self, pack: PackId) -> &str {
        &self.packs[pack.0].name
    }

    /// Every version known for a package, sorted ascending
    #[must_use]
    pub fn all_versions(&self, pack: PackId) -> &[Version] {
        &self.packs[pack.0].all_versions
    }

    /// Versions with a node, in creation order
    #[must_use]
    pub fn considered(&self, pack: PackId) -> &[VerId] {
        &self.packs[pack.0].considered
    }

    #[must_use]
    pub fn resolved(&self, pack: PackId) -> Option<VerId> {
        self.packs[pack.0].resolved
    }

    #[must_use]
    pub fn resolved_version(&self, pack: PackId) -> Option<&Version> {
        self.packs[pack.0]
            .resolved
            .map(|v| &self.vers[v.0].version)
    }

    /// The node of a version, if one was created and survived filtering
    #[must_use]
    pub fn node_of(&self, pack: PackId, version: &Version) -> Option<VerId> {
        self.packs[pack.0]
            .considered
            .iter()
            .copied()
            .find(|v| &self.vers[v.0].version == version)
    }

    #[must_use]
    pub fn version(&self, ver: VerId) -> &Version {
        &self.vers[ver.0].version
    }

    #[must_use]
    pub fn owner(&self, ver: VerId) -> PackId {
        self.vers[ver.0].pack
    }

    #[must_use]
    pub fn revision(&self, ver: VerId) -> Option<&str> {
        self.vers[ver.0].revision.as_deref()
    }

    /// Languages of a version node. Declared languages after `prepare`,
    /// the transitive union after [`DepDag::collect_languages`].
    #[must_use]
    pub fn languages(&self, ver: VerId) -> &[Language] {
        &self.vers[ver.0].langs
    }

    /// Downstream dependencies of a version node, in declaration order
    #[must_use]
    pub fn down_deps(&self, ver: VerId) -> Vec<(PackId, &VersionSpec)> {
        self.vers[ver.0]
            .down_edges
            .iter()
            .filter(|e| !self.edges[e.0].removed)
            .map(|e| (self.edges[e.0].down, &self.edges[e.0].spec))
            .collect()
    }

    // ---- prepare ----

    /// Build the DAG top-down from a root recipe
    ///
    /// For every dependency of every traversed recipe: query available
    /// versions, intersect with the dependency spec, merge into the
    /// package's known versions, pick one via the heuristics and recurse
    /// into it. A version node is traversed at most once, so diamonds
    /// converge.
    ///
    /// # Errors
    ///
    /// Aborts on the first dependency with no compatible version, on
    /// repository lookups failing, and on recipe hooks failing.
    pub async fn prepare<R: PackRepo>(
        recipe: &Recipe,
        profile: &Profile,
        repo: &R,
        heuristics: Heuristics,
    ) -> Result<Self, Error> {
        let mut dag = Self::empty(heuristics);
        let root = dag.create_pack(recipe.name());
        dag.push_version(root, recipe.version().clone());
        let root_ver = dag.create_version(root, recipe.version().clone());
        dag.set_revision(root_ver, recipe.revision()?);
        dag.set_langs(root_ver, recipe.languages().to_vec());
        dag.prepare_node(root_ver, recipe.clone(), profile, repo)
            .await?;
        Ok(dag)
    }

    fn prepare_node<'a, R: PackRepo>(
        &'a mut self,
        ver: VerId,
        recipe: Recipe,
        profile: &'a Profile,
        repo: &'a R,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + 'a>> {
        Box::pin(async move {
            for dep in recipe.dependencies(profile)? {
                let available = repo.available_versions(&dep.name).await?;
                let compatible: Vec<Version> = available
                    .into_iter()
                    .filter(|v| dep.spec.matches(v))
                    .collect();
                if compatible.is_empty() {
                    return Err(ResolveError::NoCompatibleVersion {
                        name: dep.name.clone(),
                        spec: dep.spec.to_string(),
                    }
                    .into());
                }

                let pack = match self.pack_by_name(&dep.name) {
                    Some(pack) => pack,
                    None => self.create_pack(&dep.name),
                };
                self.merge_versions(pack, compatible);

                let candidates = self.packs[pack.0].all_versions.clone();
                let chosen = self
                    .heuristics
                    .choose_version(repo, &dep.name, &candidates)
                    .await?;
                debug!(name = %dep.name, spec = %dep.spec, %chosen, "considering version");

                let (node, created) = self.get_or_create_version(pack, &chosen);
                self.add_edge(ver, pack, dep.spec.clone());

                if created {
                    let dep_recipe = repo.pack_recipe(&dep.name, &chosen, None).await?;
                    self.set_revision(node, dep_recipe.revision()?);
                    self.set_langs(node, dep_recipe.languages().to_vec());
                    self.prepare_node(node, dep_recipe, profile, repo).await?;
                }
            }
            Ok(())
        })
    }

    // ---- filter ----

    /// Bottom-up fixed point removing versions that some upstream package
    /// cannot accept
    ///
    /// A version survives iff for *every* upstream package there is at
    /// least one in-edge whose spec matches it. Terminates because each
    /// pass either removes a node or stops.
    pub fn filter(&mut self) {
        loop {
            let mut changed = false;
            for pack_idx in 1..self.packs.len() {
                // in-edges grouped by the upstream package
                let mut groups: BTreeMap<usize, Vec<EdgeId>> = BTreeMap::new();
                for &edge_id in &self.packs[pack_idx].up_edges {
                    let edge = &self.edges[edge_id.0];
                    if edge.removed || self.vers[edge.up.0].removed {
                        continue;
                    }
                    groups
                        .entry(self.vers[edge.up.0].pack.0)
                        .or_default()
                        .push(edge_id);
                }

                for ver_id in self.packs[pack_idx].considered.clone() {
                    let version = self.vers[ver_id.0].version.clone();
                    let survives = groups.values().all(|edges| {
                        edges
                            .iter()
                            .any(|e| self.edges[e.0].spec.matches(&version))
                    });
                    if !survives {
                        debug!(
                            name = %self.packs[pack_idx].name,
                            %version,
                            "filtering out version"
                        );
                        self.remove_version(ver_id);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn remove_version(&mut self, ver: VerId) {
        self.vers[ver.0].removed = true;
        let pack = self.vers[ver.0].pack;
        self.packs[pack.0].considered.retain(|v| *v != ver);
        if self.packs[pack.0].resolved == Some(ver) {
            self.packs[pack.0].resolved = None;
        }
        for edge_id in self.vers[ver.0].down_edges.clone() {
            self.edges[edge_id.0].removed = true;
            let down = self.edges[edge_id.0].down;
            self.packs[down.0].up_edges.retain(|e| *e != edge_id);
        }
    }

    // ---- resolve ----

    /// Pin one version per reachable package, top-down from the root
    ///
    /// The root's sole version is pinned first; every pinned version's
    /// down-edges then pin their target packages via the heuristics over
    /// the considered versions.
    ///
    /// # Errors
    ///
    /// - `ResolveError::NoConsideredVersion` when a package lost every
    ///   considered version in [`DepDag::filter`].
    /// - `ResolveError::SpecViolation` when a pinned version escapes the
    ///   spec of an edge on the resolved path (a programming bug).
    pub async fn resolve<R: PackRepo>(&mut self, repo: &R) -> Result<(), Error> {
        let root_ver = self.packs[0].considered.first().copied().ok_or_else(|| {
            Error::internal("root package has no version node")
        })?;
        self.packs[0].resolved = Some(root_ver);

        let mut visited: HashSet<VerId> = HashSet::from([root_ver]);
        let mut stack = vec![root_ver];
        while let Some(ver) = stack.pop() {
            for edge_id in self.vers[ver.0].down_edges.clone() {
                if self.edges[edge_id.0].removed {
                    continue;
                }
                let down = self.edges[edge_id.0].down;

                if self.packs[down.0].resolved.is_none() {
                    if self.packs[down.0].considered.is_empty() {
                        return Err(ResolveError::NoConsideredVersion {
                            name: self.packs[down.0].name.clone(),
                        }
                        .into());
                    }
                    let mut candidates: Vec<Version> = self.packs[down.0]
                        .considered
                        .iter()
                        .map(|v| self.vers[v.0].version.clone())
                        .collect();
                    candidates.sort_unstable();
                    let chosen = self
                        .heuristics
                        .choose_version(repo, &self.packs[down.0].name, &candidates)
                        .await?;
                    let node = self.node_of(down, &chosen).ok_or_else(|| {
                        Error::internal("chosen version has no considered node")
                    })?;
                    debug!(name = %self.packs[down.0].name, version = %chosen, "resolved version");
                    self.packs[down.0].resolved = Some(node);
                }

                let resolved = self.packs[down.0]
                    .resolved
                    .ok_or_else(|| Error::internal("package lost its pin during resolve"))?;
                if !self.edges[edge_id.0]
                    .spec
                    .matches(&self.vers[resolved.0].version)
                {
                    return Err(ResolveError::SpecViolation {
                        name: self.packs[down.0].name.clone(),
                        version: self.vers[resolved.0].version.to_string(),
                        spec: self.edges[edge_id.0].spec.to_string(),
                    }
                    .into());
                }
                if visited.insert(resolved) {
                    stack.push(resolved);
                }
            }
        }
        Ok(())
    }

    /// Whether every package reachable along the resolved path is pinned
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        let Some(root_ver) = self.packs[0].resolved else {
            return false;
        };
        let mut visited = HashSet::from([root_ver]);
        let mut stack = vec![root_ver];
        while let Some(ver) = stack.pop() {
            for edge_id in &self.vers[ver.0].down_edges {
                if self.edges[edge_id.0].removed {
                    continue;
                }
                let down = self.edges[edge_id.0].down;
                let Some(resolved) = self.packs[down.0].resolved else {
                    return false;
                };
                if visited.insert(resolved) {
                    stack.push(resolved);
                }
            }
        }
        true
    }

    // ---- language collection ----

    /// Propagate languages bottom-up over the resolved graph
    ///
    /// Each resolved version ends up with the sort-unique union of its
    /// declared languages, its resolved downstreams' collected languages
    /// and anything collected earlier (diamonds accumulate).
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::UnresolvedPackage` when called before the
    /// DAG is resolved.
    pub fn collect_languages(&mut self) -> Result<(), Error> {
        if !self.is_resolved() {
            return Err(ResolveError::UnresolvedPackage {
                name: self.packs[0].name.clone(),
            }
            .into());
        }
        for pack in self.traverse_bottom_up_resolved() {
            let Some(ver) = self.packs[pack.0].resolved else {
                continue;
            };
            let mut langs = self.vers[ver.0].langs.clone();
            for edge_id in self.vers[ver.0].down_edges.clone() {
                if self.edges[edge_id.0].removed {
                    continue;
                }
                let down = self.edges[edge_id.0].down;
                if let Some(down_ver) = self.packs[down.0].resolved {
                    langs.extend(self.vers[down_ver.0].langs.iter().copied());
                }
            }
            language::sort_unique(&mut langs);
            self.vers[ver.0].langs = langs;
        }
        Ok(())
    }

    // ---- traversals ----

    /// Depth-first pre-order over every package, root first; each package
    /// yielded at most once
    #[must_use]
    pub fn traverse_top_down(&self) -> Vec<PackId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.dfs(self.root(), false, &mut visited, &mut order, true);
        order
    }

    /// Depth-first post-order over every package, leaves first
    #[must_use]
    pub fn traverse_bottom_up(&self) -> Vec<PackId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.dfs(self.root(), false, &mut visited, &mut order, false);
        order
    }

    /// Like [`DepDag::traverse_top_down`], restricted to packages with a
    /// resolved node
    #[must_use]
    pub fn traverse_top_down_resolved(&self) -> Vec<PackId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.dfs(self.root(), true, &mut visited, &mut order, true);
        order
    }

    /// Like [`DepDag::traverse_bottom_up`], restricted to packages with a
    /// resolved node
    #[must_use]
    pub fn traverse_bottom_up_resolved(&self) -> Vec<PackId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.dfs(self.root(), true, &mut visited, &mut order, false);
        order
    }

    fn dfs(
        &self,
        pack: PackId,
        resolved_only: bool,
        visited: &mut HashSet<PackId>,
        order: &mut Vec<PackId>,
        pre_order: bool,
    ) {
        if !visited.insert(pack) {
            return;
        }
        if resolved_only && self.packs[pack.0].resolved.is_none() {
            return;
        }
        if pre_order {
            order.push(pack);
        }
        let vers: Vec<VerId> = if resolved_only {
            self.packs[pack.0].resolved.into_iter().collect()
        } else {
            self.packs[pack.0].considered.clone()
        };
        for ver in vers {
            for edge_id in &self.vers[ver.0].down_edges {
                if self.edges[edge_id.0].removed {
                    continue;
                }
                self.dfs(self.edges[edge_id.0].down, resolved_only, visited, order, pre_order);
            }
        }
        if !pre_order {
            order.push(pack);
        }
    }

    // ---- dot output ----

    /// Graphviz rendering of the DAG, deterministic for structural
    /// comparison: packages become clusters in discovery order, versions
    /// become nodes, dependency edges point at the target package.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph depdag {{");
        let _ = writeln!(out, "    rankdir=\"LR\";");
        for (idx, pack) in self.packs.iter().enumerate() {
            let _ = writeln!(out, "    subgraph cluster_{idx} {{");
            let _ = writeln!(out, "        label=\"{}\";", pack.name);
            let _ = writeln!(out, "        \"{}\" [shape=plaintext];", pack.name);
            for version in &pack.all_versions {
                let node = self.node_of(PackId(idx), version);
                let style = match node {
                    Some(v) if pack.resolved == Some(v) => "bold",
                    Some(_) => "solid",
                    None => "dotted",
                };
                let _ = writeln!(
                    out,
                    "        \"{}-{version}\" [shape=box, style={style}];",
                    pack.name
                );
            }
            let _ = writeln!(out, "    }}");
        }
        for pack in self.packs.iter() {
            for version in &pack.all_versions {
                let Some(ver) = self.node_of(self.by_name[&pack.name], version) else {
                    continue;
                };
                for edge_id in &self.vers[ver.0].down_edges {
                    let edge = &self.edges[edge_id.0];
                    if edge.removed {
                        continue;
                    }
                    let _ = writeln!(
                        out,
                        "    \"{}-{version}\" -> \"{}\" [label=\"{}\"];",
                        pack.name, self.packs[edge.down.0].name, edge.spec
                    );
                }
            }
        }
        let _ = writeln!(out, "}}");
        out
    }
}
