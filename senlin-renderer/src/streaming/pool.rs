use bevy::prelude::*;
use bevy::utils::HashMap;
use senlin_scene::LodTier;

/// What pooled entities are filed under. Entities built from the same
/// resource at the same tier are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub url: String,
    pub tier: LodTier,
}

/// Hidden, detached scene entities kept around for reuse. Retiring an asset
/// parks its entity here; realizing one checks here before any fetch.
#[derive(Resource)]
pub struct ResourcePool {
    idle: HashMap<PoolKey, Vec<Entity>>,
    count: usize,
    /// Idle entities tolerated before `trim` starts evicting.
    pub max_idle: usize,
}

impl Default for ResourcePool {
    fn default() -> Self {
        ResourcePool {
            idle: HashMap::default(),
            count: 0,
            max_idle: 256,
        }
    }
}

impl ResourcePool {
    pub fn with_capacity(max_idle: usize) -> Self {
        ResourcePool {
            max_idle,
            ..Default::default()
        }
    }

    pub fn acquire(&mut self, key: &PoolKey) -> Option<Entity> {
        let entities = self.idle.get_mut(key)?;
        let entity = entities.pop()?;
        if entities.is_empty() {
            self.idle.remove(key);
        }
        self.count -= 1;
        Some(entity)
    }

    pub fn release(&mut self, key: PoolKey, entity: Entity) {
        self.idle.entry(key).or_default().push(entity);
        self.count += 1;
    }

    pub fn idle_count(&self) -> usize {
        self.count
    }

    /// Entities past the idle budget, ready to be despawned by the caller.
    /// Eviction sheds from the most duplicated resource first.
    pub fn trim(&mut self) -> Vec<Entity> {
        let mut evicted = Vec::new();
        while self.count > self.max_idle {
            let Some(key) = self
                .idle
                .iter()
                .max_by_key(|(_, entities)| entities.len())
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            let Some(entities) = self.idle.get_mut(&key) else {
                break;
            };
            if let Some(entity) = entities.pop() {
                evicted.push(entity);
                self.count -= 1;
            }
            if entities.is_empty() {
                self.idle.remove(&key);
            }
        }
        evicted
    }
}
