//! List+watch informer over pods
//!
//! Wraps the kube watcher stream and maintains the local pod cache, turning
//! the raw watch protocol into Add/Update/Delete notifications. The cache is
//! the single source of pod state; the observer on top keeps none of its own.

use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use log::{debug, warn};
use std::collections::{HashMap, HashSet, VecDeque};

/// Pod lifecycle notification delivered by [`PodInformer::next`].
#[derive(Debug)]
pub enum PodEvent {
    Added(Pod),
    Updated { old: Pod, new: Pod },
    Deleted(Pod),
}

/// Informer over a filtered pod watch.
///
/// `next` is pulled from a single loop, so handlers downstream run strictly
/// serialized. On every (re-)list the watcher replays all existing pods;
/// those surface as Updated (or Added) notifications, and pods that vanished
/// while the watch was down surface as Deleted once the re-list completes.
pub struct PodInformer {
    stream: BoxStream<'static, std::result::Result<Event<Pod>, watcher::Error>>,
    cache: HashMap<String, Pod>,
    relist: Option<HashSet<String>>,
    pending: VecDeque<PodEvent>,
}

impl PodInformer {
    pub fn new(api: Api<Pod>, config: watcher::Config) -> Self {
        Self::from_stream(watcher::watcher(api, config).boxed())
    }

    pub(crate) fn from_stream(
        stream: BoxStream<'static, std::result::Result<Event<Pod>, watcher::Error>>,
    ) -> Self {
        Self {
            stream,
            cache: HashMap::new(),
            relist: None,
            pending: VecDeque::new(),
        }
    }

    /// Next pod notification, or `None` when the watch stream ends.
    pub async fn next(&mut self) -> Option<PodEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match self.stream.next().await? {
                Ok(event) => self.absorb(event),
                // the watcher re-lists and resumes on its own; nothing to do
                // here beyond surfacing the hiccup
                Err(e) => warn!("pod watch error: {}", e),
            }
        }
    }

    fn absorb(&mut self, event: Event<Pod>) {
        match event {
            Event::Init => {
                debug!("pod watch (re)list started");
                self.relist = Some(self.cache.keys().cloned().collect());
            }
            Event::InitDone => {
                // pods not re-announced during the re-list are gone
                if let Some(stale) = self.relist.take() {
                    for key in stale {
                        if let Some(pod) = self.cache.remove(&key) {
                            self.pending.push_back(PodEvent::Deleted(pod));
                        }
                    }
                }
                debug!("pod watch (re)list complete, {} pods tracked", self.cache.len());
            }
            Event::Apply(pod) | Event::InitApply(pod) => {
                let key = cache_key(&pod);
                if let Some(relist) = self.relist.as_mut() {
                    relist.remove(&key);
                }
                match self.cache.insert(key, pod.clone()) {
                    Some(old) => self.pending.push_back(PodEvent::Updated { old, new: pod }),
                    None => self.pending.push_back(PodEvent::Added(pod)),
                }
            }
            Event::Delete(pod) => {
                self.cache.remove(&cache_key(&pod));
                self.pending.push_back(PodEvent::Deleted(pod));
            }
        }
    }
}

fn cache_key(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or_default(),
        pod.metadata.name.as_deref().unwrap_or_default()
    )
}
