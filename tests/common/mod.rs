//! Shared fixtures: document trees written to temporary directories.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use wit_canon::Project;
use wit_canon::loader::load_dirs;

// =============================================================================
// Documents
// =============================================================================

/// `ns:geo@1.0.0` with the `shapes` interface.
pub const GEO_SHAPES: &str = r#"{
    "package": "ns:geo@1.0.0",
    "items": [
        { "kind": "interface", "name": "shapes", "items": [
            { "kind": "record", "name": "point",
              "fields": [{ "name": "x", "type": "s32" }, { "name": "y", "type": "s32" }] },
            { "kind": "variant", "name": "shape", "cases": [
                { "name": "circle", "type": { "tuple": ["point", "f32"] } },
                { "name": "polygon", "type": { "list": "point" } },
                { "name": "empty" }
            ]},
            { "kind": "func", "name": "area", "params": [{ "name": "s", "type": "shape" }],
              "results": ["f64"] }
        ]}
    ]
}"#;

/// A second file of the same package adding the `colors` interface.
pub const GEO_COLORS: &str = r#"{
    "package": "ns:geo@1.0.0",
    "items": [
        { "kind": "interface", "name": "colors", "items": [
            { "kind": "enum", "name": "color", "cases": ["red", "green", "blue"] },
            { "kind": "flags", "name": "channels", "flags": ["r", "g", "b", "a"] }
        ]}
    ]
}"#;

/// `ns:app` using `ns:geo` through a qualified `use`, with a world.
pub const APP: &str = r#"{
    "package": "ns:app",
    "items": [
        { "kind": "interface", "name": "canvas", "items": [
            { "kind": "use", "from": "ns:geo/shapes@1.0.0", "names": [{ "name": "point" }] },
            { "kind": "use", "from": "ns:geo/colors@1.0.0", "names": [{ "name": "color", "as": "paint" }] },
            { "kind": "type", "name": "stroke", "type": { "list": "point" } },
            { "kind": "resource", "name": "surface",
              "constructor": { "params": [{ "name": "width", "type": "u32" }] },
              "methods": [
                  { "name": "draw", "params": [{ "name": "path", "type": "stroke" },
                                               { "name": "with", "type": "paint" }] },
                  { "name": "title", "results": ["string"] }
              ]},
            { "kind": "func", "name": "blank", "results": [{ "own": "surface" }] },
            { "kind": "func", "name": "describe",
              "params": [{ "name": "s", "type": { "borrow": "surface" } }],
              "results": [{ "result": { "ok": "string", "err": "u32" } }] }
        ]},
        { "kind": "world", "name": "painter", "items": [
            { "kind": "import", "interface": "canvas" },
            { "kind": "import", "name": "log", "func": { "params": [{ "name": "msg", "type": "string" }] } },
            { "kind": "export", "name": "run", "func": { "results": ["u32"] } }
        ]}
    ]
}"#;

// =============================================================================
// Helpers
// =============================================================================

/// A temporary source tree.
pub struct SourceTree {
    pub dir: TempDir,
}

impl SourceTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Write `content` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// The geo package (two files) plus the app package, loaded.
pub fn geo_and_app() -> (SourceTree, Project) {
    let tree = SourceTree::new();
    tree.write("deps/geo/shapes.json", GEO_SHAPES);
    tree.write("deps/geo/colors.json", GEO_COLORS);
    tree.write("app/app.json", APP);
    let project = load_dirs([tree.path("deps/geo"), tree.path("app")], "json").unwrap();
    (tree, project)
}
