use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::logger;
use crate::matcher::{Template, TemplateChain};

/// Numbered visual variants appended after a base template.
const VARIANT_SUFFIXES: [&str; 3] = ["", "_2", "_3"];

/// Reference images keyed by file stem, loaded once at startup.
#[derive(Default)]
pub struct Assets {
    phone: bool,
    templates: HashMap<String, Arc<Template>>,
}

impl Assets {
    pub fn empty(phone: bool) -> Self {
        Self { phone, templates: HashMap::new() }
    }

    /// Load every `*.png` under `dir` (recursively). Unreadable images are
    /// skipped; a missing directory leaves the set empty.
    pub fn load(dir: &Path, phone: bool) -> Result<Self> {
        let mut assets = Self::empty(phone);
        if !dir.is_dir() {
            logger::warn(&format!("assets dir {} not found, nothing will match", dir.display()));
            return Ok(assets);
        }
        for path in png_files(dir)? {
            match Template::load(&path) {
                Ok(t) => {
                    assets.templates.insert(t.name().to_string(), Arc::new(t));
                }
                Err(e) => logger::warn(&format!("skipping {}: {:#}", path.display(), e)),
            }
        }
        logger::info(&format!("loaded {} templates from {}", assets.templates.len(), dir.display()));
        Ok(assets)
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name().to_string(), Arc::new(template));
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Ordered variants of `name`: in phone mode `name_phone`, `name_phone_2`,
    /// `name_phone_3` come first, then `name`, `name_2`, `name_3`.
    pub fn chain(&self, name: &str) -> TemplateChain {
        let phone_name = format!("{}_phone", name);
        let bases: Vec<&str> = if self.phone { vec![&phone_name, name] } else { vec![name] };

        let variants: Vec<Arc<Template>> = bases
            .iter()
            .flat_map(|base| VARIANT_SUFFIXES.iter().map(move |suffix| format!("{}{}", base, suffix)))
            .filter_map(|key| self.templates.get(&key).cloned())
            .collect();
        if variants.is_empty() {
            logger::debug_p("match", &format!("no template for {}", name));
        }
        TemplateChain { name: name.to_string(), variants }
    }
}

fn png_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).with_context(|| format!("reading {}", current.display()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("png")) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
