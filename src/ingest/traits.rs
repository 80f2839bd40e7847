//! Capability interfaces for the external catalog and playlist services.
//!
//! The orchestrator only ever talks to these traits. Production code plugs in
//! a provider client; tests use the scripted mocks below.
//!
//! # Example
//!
//! ```ignore
//! use playlist_minder::ingest::traits::ResolutionClient;
//!
//! async fn best<R: ResolutionClient>(client: &R, query: &SongQuery) {
//!     let candidates = client.search(query, ProcessingMode::Quick).await?;
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use super::domain::{AppendResult, CatalogError, PlaylistEntry, PlaylistId, Privacy};
use crate::model::{CandidateMatch, ProcessingMode, SongQuery};

/// Catalog search.
#[async_trait]
pub trait ResolutionClient: Send + Sync {
    /// Search the catalog for one query, best candidates first.
    ///
    /// Receives the query as the user wrote it.
    async fn search(
        &self,
        query: &SongQuery,
        mode: ProcessingMode,
    ) -> Result<Vec<CandidateMatch>, CatalogError>;

    /// Fetch disambiguation detail (artist/channel) for candidates.
    ///
    /// Providers whose search already returns full detail can rely on the
    /// default, which returns the candidates unchanged.
    async fn lookup(
        &self,
        candidates: &[CandidateMatch],
    ) -> Result<Vec<CandidateMatch>, CatalogError> {
        Ok(candidates.to_vec())
    }
}

/// Playlist creation and mutation.
#[async_trait]
pub trait PlaylistMutator: Send + Sync {
    /// Create a playlist and return its identifier.
    async fn create_playlist(
        &self,
        name: &str,
        privacy: Privacy,
    ) -> Result<PlaylistId, CatalogError>;

    /// Append tracks, reporting success or failure per identifier.
    ///
    /// An `Err` means the call as a whole failed and nothing was appended.
    async fn append_tracks(
        &self,
        playlist: &PlaylistId,
        catalog_ids: &[String],
    ) -> Result<Vec<AppendResult>, CatalogError>;

    /// Current contents of a playlist.
    async fn existing_tracks(
        &self,
        playlist: &PlaylistId,
    ) -> Result<Vec<PlaylistEntry>, CatalogError>;

    /// Most identifiers a single append call may carry.
    fn max_items_per_call(&self) -> usize {
        50
    }
}

#[async_trait]
impl<T: ResolutionClient + ?Sized> ResolutionClient for Arc<T> {
    async fn search(
        &self,
        query: &SongQuery,
        mode: ProcessingMode,
    ) -> Result<Vec<CandidateMatch>, CatalogError> {
        (**self).search(query, mode).await
    }

    async fn lookup(
        &self,
        candidates: &[CandidateMatch],
    ) -> Result<Vec<CandidateMatch>, CatalogError> {
        (**self).lookup(candidates).await
    }
}

/// Lets one store act as both resolver and mutator.
#[async_trait]
impl<T: PlaylistMutator + ?Sized> PlaylistMutator for Arc<T> {
    async fn create_playlist(
        &self,
        name: &str,
        privacy: Privacy,
    ) -> Result<PlaylistId, CatalogError> {
        (**self).create_playlist(name, privacy).await
    }

    async fn append_tracks(
        &self,
        playlist: &PlaylistId,
        catalog_ids: &[String],
    ) -> Result<Vec<AppendResult>, CatalogError> {
        (**self).append_tracks(playlist, catalog_ids).await
    }

    async fn existing_tracks(
        &self,
        playlist: &PlaylistId,
    ) -> Result<Vec<PlaylistEntry>, CatalogError> {
        (**self).existing_tracks(playlist).await
    }

    fn max_items_per_call(&self) -> usize {
        (**self).max_items_per_call()
    }
}

/// Scripted collaborators for testing.
#[cfg(test)]
pub mod mocks {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    /// Resolver that answers from a per-title script.
    ///
    /// Titles without a script resolve to no candidates.
    #[derive(Default)]
    pub struct MockResolver {
        results: HashMap<String, Result<Vec<CandidateMatch>, CatalogError>>,
        delays: HashMap<String, Duration>,
        lookup_error: Option<CatalogError>,
        lookup_delay: Option<Duration>,
        /// Titles received by `search`, in call order
        pub queries: Mutex<Vec<String>>,
        pub lookups: AtomicUsize,
    }

    impl MockResolver {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the candidates returned for a title.
        pub fn with(mut self, title: &str, candidates: Vec<CandidateMatch>) -> Self {
            self.results.insert(title.to_string(), Ok(candidates));
            self
        }

        /// Script an error for a title.
        pub fn failing(mut self, title: &str, error: CatalogError) -> Self {
            self.results.insert(title.to_string(), Err(error));
            self
        }

        /// Delay the answer for a title.
        pub fn slow(mut self, title: &str, delay: Duration) -> Self {
            self.delays.insert(title.to_string(), delay);
            self
        }

        pub fn with_lookup_error(mut self, error: CatalogError) -> Self {
            self.lookup_error = Some(error);
            self
        }

        /// Delay every lookup answer.
        pub fn slow_lookups(mut self, delay: Duration) -> Self {
            self.lookup_delay = Some(delay);
            self
        }

        pub fn searches(&self) -> usize {
            self.queries.lock().len()
        }
    }

    #[async_trait]
    impl ResolutionClient for MockResolver {
        async fn search(
            &self,
            query: &SongQuery,
            _mode: ProcessingMode,
        ) -> Result<Vec<CandidateMatch>, CatalogError> {
            self.queries.lock().push(query.title().to_string());
            if let Some(delay) = self.delays.get(query.title()) {
                tokio::time::sleep(*delay).await;
            }
            self.results
                .get(query.title())
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn lookup(
            &self,
            candidates: &[CandidateMatch],
        ) -> Result<Vec<CandidateMatch>, CatalogError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.lookup_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(ref err) = self.lookup_error {
                return Err(err.clone());
            }
            Ok(candidates.to_vec())
        }
    }

    /// Scripted behaviour for one append call.
    #[derive(Debug, Clone)]
    pub enum AppendScript {
        /// The whole call fails
        Fail(CatalogError),
        /// Listed identifiers fail, the rest succeed
        Partial(HashMap<String, CatalogError>),
        /// The call hangs for this long, then succeeds
        Hang(Duration),
    }

    /// Mutator that records every call and replays scripted failures.
    ///
    /// Calls without a script succeed for every identifier.
    pub struct MockMutator {
        pub existing: Vec<PlaylistEntry>,
        pub existing_error: Option<CatalogError>,
        pub max_per_call: usize,
        script: Mutex<VecDeque<AppendScript>>,
        /// Identifiers of every append call, in call order
        pub calls: Mutex<Vec<Vec<String>>>,
        /// Identifiers that were actually appended
        pub appended: Mutex<Vec<String>>,
        pub created: Mutex<Vec<(String, Privacy)>>,
        pub create_failures: AtomicUsize,
    }

    impl Default for MockMutator {
        fn default() -> Self {
            Self {
                existing: Vec::new(),
                existing_error: None,
                max_per_call: 50,
                script: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                appended: Mutex::new(Vec::new()),
                created: Mutex::new(Vec::new()),
                create_failures: AtomicUsize::new(0),
            }
        }
    }

    impl MockMutator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_existing(mut self, entries: Vec<PlaylistEntry>) -> Self {
            self.existing = entries;
            self
        }

        /// Fail reads of the existing playlist.
        pub fn with_existing_error(mut self, error: CatalogError) -> Self {
            self.existing_error = Some(error);
            self
        }

        pub fn with_max_per_call(mut self, max: usize) -> Self {
            self.max_per_call = max;
            self
        }

        /// Queue behaviour for the next append call.
        pub fn then(self, script: AppendScript) -> Self {
            self.script.lock().push_back(script);
            self
        }

        /// Fail the next `n` create calls with a transport error.
        pub fn failing_creates(self, n: usize) -> Self {
            self.create_failures.store(n, Ordering::SeqCst);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        pub fn appended(&self) -> Vec<String> {
            self.appended.lock().clone()
        }
    }

    #[async_trait]
    impl PlaylistMutator for MockMutator {
        async fn create_playlist(
            &self,
            name: &str,
            privacy: Privacy,
        ) -> Result<PlaylistId, CatalogError> {
            let remaining = self.create_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.create_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CatalogError::Transport("connection reset".to_string()));
            }
            self.created.lock().push((name.to_string(), privacy));
            Ok(PlaylistId(format!("PL-{}", name)))
        }

        async fn append_tracks(
            &self,
            _playlist: &PlaylistId,
            catalog_ids: &[String],
        ) -> Result<Vec<AppendResult>, CatalogError> {
            self.calls.lock().push(catalog_ids.to_vec());
            let script = self.script.lock().pop_front();

            let failures = match script {
                Some(AppendScript::Fail(err)) => return Err(err),
                Some(AppendScript::Hang(delay)) => {
                    tokio::time::sleep(delay).await;
                    HashMap::new()
                }
                Some(AppendScript::Partial(failures)) => failures,
                None => HashMap::new(),
            };

            let mut appended = self.appended.lock();
            Ok(catalog_ids
                .iter()
                .map(|id| match failures.get(id) {
                    Some(err) => AppendResult::failed(id.clone(), err.clone()),
                    None => {
                        appended.push(id.clone());
                        AppendResult::ok(id.clone())
                    }
                })
                .collect())
        }

        async fn existing_tracks(
            &self,
            _playlist: &PlaylistId,
        ) -> Result<Vec<PlaylistEntry>, CatalogError> {
            if let Some(ref err) = self.existing_error {
                return Err(err.clone());
            }
            Ok(self.existing.clone())
        }

        fn max_items_per_call(&self) -> usize {
            self.max_per_call
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_resolver_unknown_title_has_no_candidates() {
            let resolver = MockResolver::new();
            let results = resolver
                .search(&SongQuery::new(1, "Nothing"), ProcessingMode::Quick)
                .await
                .unwrap();
            assert!(results.is_empty());
            assert_eq!(resolver.searches(), 1);
        }

        #[tokio::test]
        async fn test_mock_resolver_scripted_error() {
            let resolver = MockResolver::new().failing("Song", CatalogError::RateLimited);
            let result = resolver
                .search(&SongQuery::new(1, "Song"), ProcessingMode::Quick)
                .await;
            assert!(matches!(result, Err(CatalogError::RateLimited)));
        }

        #[tokio::test]
        async fn test_mock_mutator_replays_script_in_order() {
            let mutator = MockMutator::new()
                .then(AppendScript::Fail(CatalogError::Timeout))
                .then(AppendScript::Partial(HashMap::from([(
                    "b".to_string(),
                    CatalogError::Rejected("blocked".into()),
                )])));
            let playlist = PlaylistId("PL".into());
            let ids = vec!["a".to_string(), "b".to_string()];

            assert!(mutator.append_tracks(&playlist, &ids).await.is_err());
            let results = mutator.append_tracks(&playlist, &ids).await.unwrap();
            assert!(results[0].result.is_ok());
            assert!(results[1].result.is_err());
            let results = mutator.append_tracks(&playlist, &ids).await.unwrap();
            assert!(results.iter().all(|r| r.result.is_ok()));

            assert_eq!(mutator.call_count(), 3);
            assert_eq!(mutator.appended(), vec!["a", "a", "b"]);
        }
    }
}
