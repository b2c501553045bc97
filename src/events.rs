//! Normalized project event stream.
//!
//! Subscribes to the engine event stream filtered by the project labels
//! and yields one normalized record per container event: time, action,
//! container id, service name and the non-reserved attributes, plus a
//! handle onto the container when it still exists.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::client::{EngineClient, EngineEvent, Filters};
use crate::container::Container;
use crate::errors::{ComposeError, Result};
use crate::labels::LABEL_SERVICE;

/// One normalized container event
#[derive(Debug, Clone)]
pub struct ProjectEvent {
    /// When the event happened
    pub time: SystemTime,
    /// Object type; always `container` for project events
    pub event_type: String,
    /// The action (`create`, `start`, `die`, ...)
    pub action: String,
    /// The container id
    pub id: String,
    /// The service the container realizes
    pub service: String,
    /// Actor attributes minus the reserved label namespace
    pub attributes: BTreeMap<String, String>,
    /// A handle onto the container; absent when it is already gone
    /// (destroy events)
    pub container: Option<Container>,
}

/// Stream of normalized project events
pub type ProjectEventStream = BoxStream<'static, Result<ProjectEvent>>;

/// Decode one engine event into a project event, when it concerns one of
/// the given services
pub fn decode_event(event: &EngineEvent, service_names: &HashSet<String>) -> Option<ProjectEvent> {
    if event.event_type != "container" {
        return None;
    }
    let service = event.actor.attributes.get(LABEL_SERVICE)?;
    if !service_names.contains(service) {
        return None;
    }

    let nanos = (event.time_nano % 1_000_000_000).unsigned_abs();
    let time = UNIX_EPOCH + Duration::new(event.time.unsigned_abs(), nanos as u32);

    Some(ProjectEvent {
        time,
        event_type: event.event_type.clone(),
        action: event.action.clone(),
        id: event.actor.id.clone(),
        service: service.clone(),
        attributes: event
            .actor
            .attributes
            .iter()
            .filter(|(key, _)| !key.starts_with("com.docker.compose."))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        container: None,
    })
}

/// Subscribe to the engine events for one project, yielding normalized
/// records for the given services
pub async fn project_events(
    client: Arc<dyn EngineClient>,
    project_filters: Filters,
    service_names: HashSet<String>,
) -> Result<ProjectEventStream> {
    let raw = client
        .events(&project_filters)
        .await
        .map_err(|err| ComposeError::operation_failed(err.explanation()))?;

    let stream = raw.filter_map(move |event| {
        let client = Arc::clone(&client);
        let service_names = service_names.clone();
        async move {
            let event = match event {
                Ok(event) => event,
                Err(err) => return Some(Err(ComposeError::operation_failed(err.explanation()))),
            };
            let mut decoded = decode_event(&event, &service_names)?;
            // The container may already be gone (destroy events).
            decoded.container = Container::from_id(Arc::clone(&client), &decoded.id)
                .await
                .ok();
            Some(Ok(decoded))
        }
    });
    Ok(stream.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EventActor;

    fn engine_event(event_type: &str, action: &str, service: Option<&str>) -> EngineEvent {
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), "app_web_1".to_string());
        attributes.insert("image".to_string(), "busybox".to_string());
        if let Some(service) = service {
            attributes.insert(LABEL_SERVICE.to_string(), service.to_string());
            attributes.insert(
                "com.docker.compose.project".to_string(),
                "app".to_string(),
            );
        }
        EngineEvent {
            event_type: event_type.into(),
            action: action.into(),
            actor: EventActor {
                id: "abc123".into(),
                attributes,
            },
            time: 1_700_000_000,
            time_nano: 1_700_000_000_123_456_789,
        }
    }

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_decode_container_event() {
        let event = engine_event("container", "start", Some("web"));
        let decoded = decode_event(&event, &names(&["web"])).unwrap();
        assert_eq!(decoded.action, "start");
        assert_eq!(decoded.service, "web");
        assert_eq!(decoded.id, "abc123");
        assert_eq!(decoded.attributes["name"], "app_web_1");
        // reserved labels are stripped from attributes
        assert!(!decoded
            .attributes
            .keys()
            .any(|key| key.starts_with("com.docker.compose.")));
    }

    #[test]
    fn test_decode_skips_other_types_and_services() {
        let network_event = engine_event("network", "create", Some("web"));
        assert!(decode_event(&network_event, &names(&["web"])).is_none());

        let other_service = engine_event("container", "start", Some("db"));
        assert!(decode_event(&other_service, &names(&["web"])).is_none());

        let unlabeled = engine_event("container", "start", None);
        assert!(decode_event(&unlabeled, &names(&["web"])).is_none());
    }

    #[test]
    fn test_event_time_includes_nanos() {
        let event = engine_event("container", "die", Some("web"));
        let decoded = decode_event(&event, &names(&["web"])).unwrap();
        let elapsed = decoded.time.duration_since(UNIX_EPOCH).unwrap();
        assert_eq!(elapsed.as_secs(), 1_700_000_000);
        assert_eq!(elapsed.subsec_nanos(), 123_456_789);
    }
}
