//! Channel seam to the system under test.
//!
//! The wire protocol is out of scope for the harness. What it sees is an
//! outbound fire-and-forget send ([`SutLink::transmit`]) and inbound
//! notifications that arrive by *source name* and are fanned out through a
//! [`ReplyRouter`]. Bindings are registered once at startup; dispatch to an
//! unbound source is an error rather than a silent drop.
//!
//! [`ReplayLink`] is the built-in link for dry-runs and tests: it answers
//! transmissions from a script, from a background thread, which preserves
//! the asynchronous timing of a real system under test.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::correlate::ReplyHandle;
use crate::dataset::CategoryId;
use crate::error::{Error, Result};

/// Source name carrying annotation replies from the system under test.
pub const ANNOTATION_SOURCE: &str = "annotations";

/// An encoded image handed to the system under test. The payload keeps its
/// on-disk encoding; `width`/`height` come from the file header.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmittedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// File name of the source image, used as the case identity.
    pub name: String,
}

/// A predicted bounding box attached to a reply. Carried through to reports
/// for visualization; verdict evaluation reads only the category ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedBox {
    pub category_id: CategoryId,
    /// `[x, y, width, height]` in pixels of the transmitted image.
    pub bbox: [f64; 4],
}

/// One asynchronous annotation notification from the system under test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationReply {
    /// Distinct category ids the system claims to have recognized.
    pub categories: BTreeSet<CategoryId>,
    #[serde(default)]
    pub boxes: Vec<PredictedBox>,
}

impl AnnotationReply {
    /// Build a reply from bare category ids, deduplicating them.
    #[must_use]
    pub fn from_categories(ids: impl IntoIterator<Item = CategoryId>) -> Self {
        Self {
            categories: ids.into_iter().collect(),
            boxes: Vec::new(),
        }
    }
}

/// Outbound channel to the system under test.
///
/// `transmit` hands over one encoded image and returns as soon as the image
/// is on its way. Replies never come back through this trait; they arrive
/// later via the [`ReplyRouter`].
pub trait SutLink {
    fn transmit(&self, image: &TransmittedImage) -> Result<()>;
}

type ReplyHandler = Box<dyn Fn(AnnotationReply) + Send + Sync>;

/// Registry mapping inbound source names to reply handlers.
///
/// Link implementations call [`ReplyRouter::dispatch`] when a notification
/// arrives. All bindings are explicit and resolved up front, so a typo in a
/// source name fails loudly on the first notification instead of silently
/// never delivering.
#[derive(Default)]
pub struct ReplyRouter {
    routes: HashMap<String, ReplyHandler>,
}

impl ReplyRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard wiring: the annotation source feeds a correlator handle.
    #[must_use]
    pub fn for_annotations(handle: ReplyHandle) -> Self {
        let mut router = Self::new();
        router.bind(ANNOTATION_SOURCE, move |reply| handle.post(reply));
        router
    }

    /// Bind a handler to a source name, replacing any previous binding.
    pub fn bind(
        &mut self,
        source: impl Into<String>,
        handler: impl Fn(AnnotationReply) + Send + Sync + 'static,
    ) -> &mut Self {
        self.routes.insert(source.into(), Box::new(handler));
        self
    }

    /// Deliver a notification to the handler bound to `source`.
    pub fn dispatch(&self, source: &str, reply: AnnotationReply) -> Result<()> {
        match self.routes.get(source) {
            Some(handler) => {
                handler(reply);
                Ok(())
            }
            None => Err(Error::UnboundSource(source.to_string())),
        }
    }

    /// True when a handler is bound to `source`.
    #[must_use]
    pub fn is_bound(&self, source: &str) -> bool {
        self.routes.contains_key(source)
    }

    /// Bound source names, sorted.
    #[must_use]
    pub fn sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ReplyRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyRouter")
            .field("sources", &self.sources())
            .finish()
    }
}

/// Scripted replies keyed by transmitted image name.
pub type ReplyScript = HashMap<String, Vec<CategoryId>>;

/// A scripted stand-in for the system under test.
///
/// Each transmission is looked up in the script by image name. A hit posts
/// the scripted categories through the router after the configured delay; a
/// miss stays silent, which drives the reply-timeout path downstream. An
/// empty script therefore models a dead system under test.
#[derive(Debug)]
pub struct ReplayLink {
    script: ReplyScript,
    delay: Duration,
    router: Arc<ReplyRouter>,
}

impl ReplayLink {
    #[must_use]
    pub fn new(script: ReplyScript, router: Arc<ReplyRouter>) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            router,
        }
    }

    /// Delay each scripted reply, simulating inference latency.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Load a script from a JSON file of `{"image name": [category ids]}`.
    pub fn load_script(path: impl AsRef<Path>) -> Result<ReplyScript> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl SutLink for ReplayLink {
    fn transmit(&self, image: &TransmittedImage) -> Result<()> {
        let Some(ids) = self.script.get(&image.name) else {
            debug!(name = %image.name, "no scripted reply; staying silent");
            return Ok(());
        };
        let reply = AnnotationReply::from_categories(ids.iter().copied());
        let router = Arc::clone(&self.router);
        let delay = self.delay;
        // Posting from a spawned thread keeps the reply asynchronous with
        // respect to the caller, exactly like a real system under test.
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            if let Err(e) = router.dispatch(ANNOTATION_SOURCE, reply) {
                warn!(error = %e, "scripted reply was dropped");
            }
        });
        Ok(())
    }
}
