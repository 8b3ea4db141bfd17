use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use minijinja::{Environment, Error, State};
use sha2::{Digest, Sha256};

/// Resolves `{{ asset("app.css") }}` to a cache-busting URL under `/static`.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    root: PathBuf,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Arc::default(),
        }
    }

    pub fn asset_path(&self, path: &str) -> String {
        if let Some(hashed) = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(path).cloned())
        {
            return hashed;
        }

        let Ok(contents) = fs::read(self.root.join(path)) else {
            return format!("/static/{}", path);
        };
        let digest = Sha256::digest(&contents);
        let fingerprint = hex::encode(&digest[..6]);
        let hashed = format!("/static/{}?v={}", path, fingerprint);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(path.to_string(), hashed.clone());
        }
        hashed
    }

    pub fn register(&self, env: &mut Environment<'_>) {
        let loader = self.clone();
        env.add_function(
            "asset",
            move |_state: &State, path: String| -> Result<String, Error> {
                Ok(loader.asset_path(&path))
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprints_existing_files_and_passes_through_missing_ones() {
        let loader = AssetLoader::new("static");
        let css = loader.asset_path("app.css");
        assert!(css.starts_with("/static/app.css?v="));
        assert_eq!(css.len(), "/static/app.css?v=".len() + 12);
        assert_eq!(loader.asset_path("app.css"), css);

        assert_eq!(loader.asset_path("missing.js"), "/static/missing.js");
    }
}
