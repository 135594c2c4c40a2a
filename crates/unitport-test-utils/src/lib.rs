//! Testing utilities for the Unitport workspace
//!
//! Shared fixtures: a small unit closure, in-memory indexes and throwaway
//! installations on disk.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use unitport_graph::{encode_big, MemoryIndex};

pub const TANK_PATH: &str = "Data/INI/Object/Tank.ini";
pub const TANK_INI: &str = "\
Object Tank
  BuildCost = 800
  MaxHealth = 300
  Armor = TankArmor
  Draw = AVTank
  Weapon = PRIMARY TankGun
  Prerequisites
    Object = AmericaWarFactory
  End
End
";

pub const WEAPON_PATH: &str = "Data/INI/Weapon.ini";
pub const WEAPON_INI: &str = "\
Weapon TankGun
  PrimaryDamage = 40
  ProjectileObject = TankShell
End
";

pub const PROJECTILE_PATH: &str = "Data/INI/Object/Projectiles.ini";
pub const PROJECTILE_INI: &str = "\
Object TankShell
  ProjectileDetonationFX = FX_TankShellHit
End
";

pub const FX_PATH: &str = "Data/INI/FXList.ini";
pub const FX_INI: &str = "\
FXList FX_TankShellHit
End
";

pub const ARMOR_PATH: &str = "Data/INI/Armor.ini";
pub const ARMOR_INI: &str = "\
Armor TankArmor
  DamageScalar = 100%
End
";

pub const MODEL_PATH: &str = "Art/W3D/AVTank.w3d";
pub const MODEL_BYTES: &[u8] = b"W3D\0tank-model";

/// Every fixture file, root first
pub fn tank_files() -> Vec<(&'static str, &'static [u8])> {
    vec![
        (TANK_PATH, TANK_INI.as_bytes()),
        (WEAPON_PATH, WEAPON_INI.as_bytes()),
        (ARMOR_PATH, ARMOR_INI.as_bytes()),
        (PROJECTILE_PATH, PROJECTILE_INI.as_bytes()),
        (FX_PATH, FX_INI.as_bytes()),
        (MODEL_PATH, MODEL_BYTES),
    ]
}

/// In-memory index holding the Tank closure
pub fn tank_index() -> MemoryIndex {
    MemoryIndex::new()
        .with_file(TANK_PATH, TANK_INI)
        .with_file(WEAPON_PATH, WEAPON_INI)
        .with_file(ARMOR_PATH, ARMOR_INI)
        .with_file(PROJECTILE_PATH, PROJECTILE_INI)
        .with_file(FX_PATH, FX_INI)
        .with_asset("AVTank", unitport_graph::NodeKind::Model, MODEL_PATH, MODEL_BYTES)
}

/// Throwaway installation directory
#[derive(Debug)]
pub struct Installation {
    dir: TempDir,
}

impl Default for Installation {
    fn default() -> Self {
        Self::new()
    }
}

impl Installation {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Installation holding the Tank closure as loose files
    pub fn tank_source() -> Self {
        let mut install = Self::new();
        for (path, bytes) in tank_files() {
            install.write(path, bytes);
        }
        install
    }

    /// Installation holding the Tank closure inside one `.big` container
    pub fn tank_source_packed(container: &str) -> Self {
        let install = Self::new();
        let entries: Vec<(&str, &[u8])> = tank_files();
        std::fs::write(install.root().join(container), encode_big(&entries)).unwrap();
        install
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&mut self, relative: &str, bytes: impl AsRef<[u8]>) -> &mut Self {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
        self
    }

    pub fn with_file(mut self, relative: &str, text: &str) -> Self {
        self.write(relative, text);
        self
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Visible files and contents, skipping hidden directories
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        walkdir::WalkDir::new(self.root())
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let relative = e
                    .path()
                    .strip_prefix(self.root())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                (relative, std::fs::read(e.path()).unwrap())
            })
            .collect()
    }

    /// Paths of leftover temp files anywhere under the root
    pub fn temp_artifacts(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(self.root())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".unitport-tmp"))
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}
