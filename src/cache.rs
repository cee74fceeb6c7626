//! Caché clave-valor en memoria, compartida por todo el proceso, con caducidad.
//!
//! No hay coordinación por clave: dos peticiones concurrentes pueden fallar la
//! caché y escribir ambas; gana la última escritura. Los valores son
//! re-derivaciones de las mismas entradas.

use std::time::{Duration, Instant};

use moka::{sync::Cache, Expiry};
use tracing::debug;

/// Propósito con el que se guarda un valor para un repositorio y ruta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePurpose {
    Questions,
}

impl CachePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Questions => "questions",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Cada entrada caduca según la duración con la que se guardó; reescribirla
/// reinicia el plazo.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

#[derive(Clone)]
pub struct ContextCache {
    entries: Cache<String, Entry>,
    default_ttl: Duration,
}

impl ContextCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().expire_after(PerEntryTtl).build(),
            default_ttl,
        }
    }

    pub fn key(repo_url: &str, code_path: &str, purpose: CachePurpose) -> String {
        format!("{}-{}-{}", repo_url, code_path, purpose.as_str())
    }

    /// Devuelve el valor si existe y no ha caducado.
    pub fn get(&self, key: &str) -> Option<String> {
        let hit = self.entries.get(key).map(|entry| entry.value);
        if hit.is_none() {
            debug!("Fallo de caché: {}", key);
        }
        hit
    }

    /// Guarda un valor con la caducidad indicada o la caducidad por defecto.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.into(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.entries.insert(key.into(), entry);
    }
}
