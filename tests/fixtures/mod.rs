//! On-disk hierarchy fixtures
//!
//! Each fixture is a temporary directory holding a `hiera.yaml` and whatever
//! data files a test writes next to it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use hiera_lookup::{Session, SessionSettings};
use tempfile::TempDir;

pub struct Hierarchy {
    dir: TempDir,
}

impl Hierarchy {
    /// A fixture whose `hiera.yaml` holds `config`.
    pub fn new(config: &str) -> Self {
        let fixture = Self::empty();
        fixture.write("hiera.yaml", config);
        fixture
    }

    /// A fixture without a `hiera.yaml`.
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> &Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, contents).expect("write fixture file");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("hiera.yaml")
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings::new(self.config_path())
    }

    pub fn session(&self) -> Session {
        Session::new(self.settings())
    }
}

/// Two levels holding the same `hash` root with overlapping keys.
pub fn two_level_hierarchy() -> Hierarchy {
    let fixture = Hierarchy::new(
        r#"
version: 5
hierarchy:
  - name: First
    path: first.yaml
  - name: Second
    path: second.yaml
"#,
    );
    fixture.write(
        "data/first.yaml",
        "hash:\n  a: first value of a\n  c: first value of c\n",
    );
    fixture.write(
        "data/second.yaml",
        "hash:\n  b: second value of b\n  c: second value of c\n",
    );
    fixture
}
