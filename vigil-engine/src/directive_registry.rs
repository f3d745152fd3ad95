use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;
use vigil_core::{Directive, DirectiveStatus};

/// Single process-wide store of active monitoring directives.
///
/// This is the component the spec's Design Notes single out by name: an
/// earlier revision of the source system let the API and the workers each
/// construct their own instance, so a directive removal on one side never
/// reached the other. The fix here is structural, not a code review
/// reminder — `DirectiveRegistry` is constructed exactly once by whatever
/// assembles the process (`vigil-server`'s `main`) and handed out as a
/// single `Arc<DirectiveRegistry>` to the API layer and to every
/// `CameraWorker`. Nothing in this crate re-constructs one.
#[derive(Default)]
pub struct DirectiveRegistry {
    directives: RwLock<HashMap<Uuid, Directive>>,
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, directive: Directive) -> Uuid {
        let id = directive.id;
        self.directives.write().insert(id, directive);
        id
    }

    /// Removes a directive. Returns `true` if a directive with that id was
    /// present (idempotent: removing an unknown id is not an error, spec
    /// "Round-trip / idempotence").
    pub fn remove(&self, id: Uuid) -> bool {
        self.directives.write().remove(&id).is_some()
    }

    pub fn get(&self, id: Uuid) -> Option<Directive> {
        self.directives.read().get(&id).cloned()
    }

    /// Snapshot of directives whose scope includes `camera_id` and whose
    /// status is `Active`. Readers take a copy-on-write snapshot rather than
    /// holding the lock across worker processing (spec 4.5, 5).
    pub fn list_for_camera(&self, camera_id: &str) -> Vec<Directive> {
        self.directives
            .read()
            .values()
            .filter(|d| d.is_active() && d.camera_scope.applies_to(camera_id))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Directive> {
        self.directives.read().values().cloned().collect()
    }

    pub fn active_any(&self) -> bool {
        self.directives.read().values().any(Directive::is_active)
    }

    pub fn active_any_for_camera(&self, camera_id: &str) -> bool {
        !self.list_for_camera(camera_id).is_empty()
    }

    pub fn pause(&self, id: Uuid) -> bool {
        let mut directives = self.directives.write();
        if let Some(d) = directives.get_mut(&id) {
            d.status = DirectiveStatus::Paused;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{CameraScope, DirectiveKind};

    fn directive(scope: CameraScope) -> Directive {
        Directive::new(DirectiveKind::ObjectDetection, "scissors", scope)
    }

    #[test]
    fn list_for_camera_honours_scope() {
        let registry = DirectiveRegistry::new();
        registry.add(directive(CameraScope::Single("cam1".into())));
        registry.add(directive(CameraScope::All));
        registry.add(directive(CameraScope::Single("cam2".into())));

        assert_eq!(registry.list_for_camera("cam1").len(), 2);
        assert_eq!(registry.list_for_camera("cam3").len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = DirectiveRegistry::new();
        let id = registry.add(directive(CameraScope::All));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
    }

    #[test]
    fn active_any_false_when_empty() {
        let registry = DirectiveRegistry::new();
        assert!(!registry.active_any());
        registry.add(directive(CameraScope::All));
        assert!(registry.active_any());
    }

    #[test]
    fn reprocessing_same_directive_id_is_a_noop() {
        let registry = DirectiveRegistry::new();
        let d = directive(CameraScope::All);
        let id = d.id;
        registry.add(d.clone());
        registry.add(d);
        assert_eq!(registry.all().iter().filter(|d| d.id == id).count(), 1);
    }
}
