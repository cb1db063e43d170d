// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! A routing session: one graph, a set of named profiles and their preparations.

use std::path::Path as FsPath;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::routing::alternative::{self, AlternativeConfig};
use crate::routing::ch::{ChConfig, ContractionHierarchy};
use crate::routing::landmark::{LandmarkConfig, LandmarkStorage};
use crate::routing::{dijkstra, Path, PathError, PreparationError, QueryOptions, QueryScratch};
use crate::storage::{self, StorageError};
use crate::weighting::{CustomModel, CustomWeighting, ModelError, Weighting, WeightingKey};
use crate::{Graph, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid router config: {0}")]
    Config(String),

    #[error("duplicate profile: {0}")]
    DuplicateProfile(String),

    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("profile {profile}: {source}")]
    Model {
        profile: String,
        #[source]
        source: ModelError,
    },

    #[error("profile {profile}: {source}")]
    Preparation {
        profile: String,
        #[source]
        source: PreparationError,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Search algorithm of a [Request].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// The fastest algorithm able to answer the request: a contraction hierarchy,
    /// then landmarks, then plain Dijkstra.
    #[default]
    Auto,
    Dijkstra,
    ContractionHierarchy,
    Landmarks,
}

/// Configuration of a single profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    pub name: String,
    pub custom_model: CustomModel,

    /// Apply the graph's turn-cost table. Excludes a contraction hierarchy.
    pub turn_costs: bool,

    /// Prepare a contraction hierarchy.
    pub ch: bool,

    /// Prepare landmarks.
    pub landmarks: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    pub profiles: Vec<ProfileConfig>,
    pub ch: ChConfig,
    pub landmarks: LandmarkConfig,
    pub alternatives: AlternativeConfig,
}

impl RouterConfig {
    pub fn from_json(json: &str) -> Result<Self, RouterError> {
        serde_json::from_str(json).map_err(|e| RouterError::Config(e.to_string()))
    }
}

/// A route query.
#[derive(Debug, Clone)]
pub struct Request {
    pub profile: String,
    pub from: NodeId,
    pub to: NodeId,
    pub algorithm: Algorithm,
    pub options: QueryOptions,
}

impl Request {
    pub fn new<S: Into<String>>(profile: S, from: NodeId, to: NodeId) -> Self {
        Self {
            profile: profile.into(),
            from,
            to,
            algorithm: Algorithm::Auto,
            options: QueryOptions::default(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug)]
struct Profile {
    config: ProfileConfig,
    weighting: Arc<CustomWeighting>,
    ch: Option<Arc<ContractionHierarchy>>,
    landmarks: Option<Arc<LandmarkStorage>>,
}

/// Answers route requests over a shared graph.
///
/// The router is `Send + Sync`; concurrent queries each borrow their own
/// [QueryScratch] from an internal pool.
#[derive(Debug)]
pub struct Router {
    graph: Arc<Graph>,
    profiles: FxHashMap<String, Profile>,
    alternatives: AlternativeConfig,
    pool: Mutex<Vec<QueryScratch>>,
}

impl Router {
    /// Builds the weightings of all profiles and runs the requested preparations.
    pub fn new(graph: Arc<Graph>, config: &RouterConfig) -> Result<Self, RouterError> {
        Self::build(graph, config, None)
    }

    /// Like [Router::new], but first tries to load preparations saved by
    /// [Router::save_preparations] from `dir`. Missing files are prepared from scratch.
    pub fn with_saved_preparations<P: AsRef<FsPath>>(
        graph: Arc<Graph>,
        config: &RouterConfig,
        dir: P,
    ) -> Result<Self, RouterError> {
        Self::build(graph, config, Some(dir.as_ref()))
    }

    fn build(graph: Arc<Graph>, config: &RouterConfig, dir: Option<&FsPath>) -> Result<Self, RouterError> {
        let started = Instant::now();
        config
            .alternatives
            .validate()
            .map_err(|e| RouterError::Config(e.to_string()))?;
        let mut profiles = FxHashMap::default();

        for p in &config.profiles {
            if profiles.contains_key(&p.name) {
                return Err(RouterError::DuplicateProfile(p.name.clone()));
            }
            let profile = Profile::new(&graph, p, config, dir)?;
            profiles.insert(p.name.clone(), profile);
        }

        log::info!(
            "router ready with {} profiles over {} nodes in {:.2?}",
            profiles.len(),
            graph.node_count(),
            started.elapsed()
        );

        Ok(Self {
            graph,
            profiles,
            alternatives: config.alternatives.clone(),
            pool: Mutex::new(Vec::new()),
        })
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// The weighting of a profile.
    pub fn weighting(&self, profile: &str) -> Result<Arc<dyn Weighting>, RouterError> {
        let w: Arc<dyn Weighting> = self.profile(profile)?.weighting.clone();
        Ok(w)
    }

    pub fn contraction_hierarchy(&self, profile: &str) -> Option<&Arc<ContractionHierarchy>> {
        self.profiles.get(profile)?.ch.as_ref()
    }

    pub fn landmarks(&self, profile: &str) -> Option<&Arc<LandmarkStorage>> {
        self.profiles.get(profile)?.landmarks.as_ref()
    }

    fn profile(&self, name: &str) -> Result<&Profile, RouterError> {
        self.profiles
            .get(name)
            .ok_or_else(|| RouterError::UnknownProfile(name.to_string()))
    }

    /// Finds the cheapest route for a request.
    pub fn route(&self, request: &Request) -> Result<Path, RouterError> {
        let profile = self.profile(&request.profile)?;
        let g = &*self.graph;
        let (from, to, options) = (request.from, request.to, &request.options);
        let w = &*profile.weighting;

        let algorithm = match request.algorithm {
            Algorithm::Auto if profile.ch.is_some() && options.skip_nodes.is_empty() => {
                Algorithm::ContractionHierarchy
            }
            Algorithm::Auto if profile.landmarks.is_some() => Algorithm::Landmarks,
            Algorithm::Auto => Algorithm::Dijkstra,
            a => a,
        };

        let path = self.with_scratch(|scratch| match algorithm {
            Algorithm::ContractionHierarchy => match &profile.ch {
                Some(ch) => ch.find_route(g, w, from, to, options, scratch),
                None => Err(missing("ch", &request.profile)),
            },
            Algorithm::Landmarks => match &profile.landmarks {
                Some(lm) => lm.find_route(g, w, from, to, options, scratch),
                None => Err(missing("landmarks", &request.profile)),
            },
            _ => dijkstra::find_route(g, w, from, to, options, scratch),
        })?;
        Ok(path)
    }

    /// Finds the cheapest route and its alternatives, within the router's [AlternativeConfig].
    ///
    /// A contraction hierarchy can't produce alternatives, so [Algorithm::Auto]
    /// picks landmarks when prepared and Dijkstra otherwise.
    pub fn route_alternatives(&self, request: &Request) -> Result<Vec<Path>, RouterError> {
        let profile = self.profile(&request.profile)?;
        let g = &*self.graph;
        let (from, to, options) = (request.from, request.to, &request.options);
        let w = &*profile.weighting;
        let config = &self.alternatives;

        let algorithm = match request.algorithm {
            Algorithm::ContractionHierarchy => {
                return Err(PathError::Unsupported("alternatives with a contraction hierarchy").into())
            }
            Algorithm::Auto if profile.landmarks.is_some() => Algorithm::Landmarks,
            Algorithm::Auto => Algorithm::Dijkstra,
            a => a,
        };

        let paths = self.with_scratch(|scratch| match algorithm {
            Algorithm::Landmarks => match &profile.landmarks {
                Some(lm) => lm.find_alternatives(g, w, from, to, config, options, scratch),
                None => Err(missing("landmarks", &request.profile)),
            },
            _ => alternative::find_alternatives(g, w, from, to, config, options, scratch),
        })?;
        Ok(paths)
    }

    /// Finds a route with the profile's model merged with a per-request `overlay`.
    ///
    /// Preparations don't apply to the merged model, so only [Algorithm::Auto]
    /// and [Algorithm::Dijkstra] are accepted.
    pub fn route_with_model(&self, request: &Request, overlay: &CustomModel) -> Result<Path, RouterError> {
        let profile = self.profile(&request.profile)?;
        if !matches!(request.algorithm, Algorithm::Auto | Algorithm::Dijkstra) {
            return Err(PathError::Unsupported("custom model with a prepared algorithm").into());
        }

        let model_error = |source| RouterError::Model {
            profile: request.profile.clone(),
            source,
        };
        let merged = CustomModel::merge(&profile.config.custom_model, overlay).map_err(model_error)?;
        let mut weighting =
            CustomWeighting::new(&request.profile, &merged, self.graph.encoding()).map_err(model_error)?;
        if profile.config.turn_costs {
            weighting = weighting.with_turn_costs(self.graph.turn_costs().clone());
        }

        let path = self.with_scratch(|scratch| {
            dijkstra::find_route(
                &self.graph,
                &weighting,
                request.from,
                request.to,
                &request.options,
                scratch,
            )
        })?;
        Ok(path)
    }

    /// Writes the preparations of every profile into `dir`, as `{profile}.ch`
    /// and `{profile}.landmarks`.
    pub fn save_preparations<P: AsRef<FsPath>>(&self, dir: P) -> Result<(), RouterError> {
        let dir = dir.as_ref();
        for (name, p) in &self.profiles {
            if let Some(ch) = &p.ch {
                storage::save(dir.join(format!("{}.ch", name)), &**ch, &*self.graph)?;
            }
            if let Some(lm) = &p.landmarks {
                storage::save(dir.join(format!("{}.landmarks", name)), &**lm, &*self.graph)?;
            }
        }
        Ok(())
    }

    fn with_scratch<T>(&self, f: impl FnOnce(&mut QueryScratch) -> T) -> T {
        let taken = self.pool.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let mut scratch = taken.unwrap_or_else(|| QueryScratch::new(self.graph.node_count()));
        let result = f(&mut scratch);
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(scratch);
        result
    }
}

fn missing(kind: &'static str, profile: &str) -> PathError {
    PathError::MissingPreparation {
        kind,
        weighting: profile.to_string(),
    }
}

impl Profile {
    fn new(
        graph: &Graph,
        config: &ProfileConfig,
        router: &RouterConfig,
        dir: Option<&FsPath>,
    ) -> Result<Self, RouterError> {
        let name = &config.name;
        let mut weighting = CustomWeighting::new(name, &config.custom_model, graph.encoding())
            .map_err(|source| RouterError::Model {
                profile: name.clone(),
                source,
            })?;
        if config.turn_costs {
            weighting = weighting.with_turn_costs(graph.turn_costs().clone());
        }

        let preparation_error = |source| RouterError::Preparation {
            profile: name.clone(),
            source,
        };

        let ch = if config.ch {
            let saved = load_saved::<ContractionHierarchy>(dir, name, "ch", graph)?
                .filter(|ch| is_current(ch.weighting(), &weighting, "ch"));
            let ch = match saved {
                Some(ch) => ch,
                None => ContractionHierarchy::prepare(graph, &weighting, &router.ch)
                    .map_err(preparation_error)?,
            };
            Some(Arc::new(ch))
        } else {
            None
        };

        let landmarks = if config.landmarks {
            let saved = load_saved::<LandmarkStorage>(dir, name, "landmarks", graph)?
                .filter(|lm| is_current(lm.weighting(), &weighting, "landmarks"));
            let lm = match saved {
                Some(lm) => lm,
                None => LandmarkStorage::prepare(graph, &weighting, &router.landmarks)
                    .map_err(preparation_error)?,
            };
            Some(Arc::new(lm))
        } else {
            None
        };

        Ok(Self {
            config: config.clone(),
            weighting: Arc::new(weighting),
            ch,
            landmarks,
        })
    }
}

/// Checks that a saved preparation was built for the profile's current weighting.
fn is_current(key: &WeightingKey, weighting: &CustomWeighting, kind: &str) -> bool {
    if key.matches(weighting) {
        return true;
    }
    log::warn!(
        "saved {} preparation of {} was built for another configuration, preparing from scratch",
        kind,
        key.name
    );
    false
}

/// Loads `{dir}/{profile}.{extension}` if it exists.
fn load_saved<T: storage::Persist<Context = Graph>>(
    dir: Option<&FsPath>,
    profile: &str,
    extension: &str,
    graph: &Graph,
) -> Result<Option<T>, RouterError> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    let path = dir.join(format!("{}.{}", profile, extension));
    if !path.exists() {
        log::warn!("{} not found, preparing from scratch", path.display());
        return Ok(None);
    }
    Ok(Some(storage::load(&path, graph)?))
}
