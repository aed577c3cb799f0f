//! Loading document trees from disk and resolving references across packages.

mod common;

use common::{APP, GEO_COLORS, GEO_SHAPES, SourceTree, geo_and_app};
use wit_canon::loader::{LoadError, load_dirs};
use wit_canon::marshal::Direction;
use wit_canon::model::Type;
use wit_canon::{CoreType, Error, ResolveError};

#[test]
fn test_point_resolves_through_qualified_name() {
    let (_tree, project) = geo_and_app();
    let point = project.find_type("ns:geo/shapes.point@1.0.0").unwrap();
    let abi = project.abi();
    assert_eq!(abi.flatten(point).unwrap(), vec![CoreType::I32, CoreType::I32]);
    assert_eq!(abi.memory_size(point).unwrap(), 8);
    assert_eq!(abi.memory_align(point).unwrap(), 4);
}

#[test]
fn test_used_point_is_the_definition_in_shapes() {
    let (_tree, project) = geo_and_app();
    let direct = project.find_type("ns:geo/shapes.point@1.0.0").unwrap();
    let used = project.find_type("ns:app/canvas.point").unwrap();
    assert_eq!(used, direct);

    // The same definition is reached from inside `shapes` and through a
    // local reference in the importing interface.
    let resolver = project.resolver();
    let stroke = project.find_type("ns:app/canvas.stroke").unwrap();
    let Some(Type::List(element)) = project.types().get(stroke) else {
        panic!("stroke should be a list");
    };
    assert_eq!(resolver.resolve(*element).unwrap(), direct);

    let shape = project.find_type("ns:geo/shapes.shape@1.0.0").unwrap();
    let Some(Type::Variant(variant)) = project.types().get(shape) else {
        panic!("shape should be a variant");
    };
    let polygon = variant.cases.iter().find(|c| c.name == "polygon").unwrap();
    let Some(Type::List(element)) = project.types().get(polygon.ty.unwrap()) else {
        panic!("polygon should carry a list");
    };
    assert_eq!(resolver.resolve(*element).unwrap(), direct);
}

#[test]
fn test_unversioned_reference_selects_loaded_version() {
    let (_tree, project) = geo_and_app();
    let versioned = project.find_type("ns:geo/shapes.point@1.0.0").unwrap();
    let unversioned = project.find_type("ns:geo/shapes.point").unwrap();
    assert_eq!(versioned, unversioned);
}

#[test]
fn test_files_of_one_directory_merge_into_one_package() {
    let (_tree, project) = geo_and_app();
    assert_eq!(project.packages().len(), 2);
    assert!(project.find_type("ns:geo/colors.color@1.0.0").is_ok());
    assert!(project.find_type("ns:geo/shapes.shape@1.0.0").is_ok());
}

#[test]
fn test_use_alias_chain_reaches_enum() {
    let (_tree, project) = geo_and_app();
    let paint = project.find_type("ns:app/canvas.paint").unwrap();
    match project.types().get(paint) {
        Some(Type::Enum(color)) => {
            assert_eq!(color.name.name, "color");
            assert_eq!(color.cases, vec!["red", "green", "blue"]);
        }
        other => panic!("expected enum, got {other:?}"),
    }
}

#[test]
fn test_multiple_packages_in_one_directory_fails_load() {
    let tree = SourceTree::new();
    tree.write("wit/a.json", GEO_SHAPES);
    tree.write("wit/b.json", APP);
    let err = load_dirs([tree.path("wit")], "json").unwrap_err();
    match &err {
        LoadError::MultiplePackages {
            first,
            second,
            directory,
        } => {
            assert_eq!(first, "ns:geo@1.0.0");
            assert_eq!(second, "ns:app");
            assert!(directory.ends_with("wit"));
        }
        other => panic!("expected MultiplePackages, got {other:?}"),
    }
    assert!(err.to_string().starts_with(
        "Only a single package is allowed per directory. Found multiple packages: ns:geo@1.0.0 and ns:app in directory '"
    ));
}

#[test]
fn test_other_extensions_are_ignored() {
    let tree = SourceTree::new();
    tree.write("geo/shapes.json", GEO_SHAPES);
    tree.write("geo/notes.txt", "not a document");
    tree.write("geo/nested/colors.json", GEO_COLORS);
    let project = load_dirs([tree.path("geo")], "json").unwrap();
    assert!(project.find_type("ns:geo/shapes.point@1.0.0").is_ok());
    // Subdirectories are separate groups and are not read.
    assert!(project.find_type("ns:geo/colors.color@1.0.0").is_err());
}

#[test]
fn test_malformed_document_names_the_file() {
    let tree = SourceTree::new();
    let path = tree.write("wit/broken.json", "{ \"package\": ");
    let err = load_dirs([tree.path("wit")], "json").unwrap_err();
    assert!(matches!(err, LoadError::Json { .. }));
    assert!(err.to_string().contains(&path.display().to_string()));
}

#[test]
fn test_missing_dependency_names_symbol_and_origin() {
    let tree = SourceTree::new();
    tree.write("app/app.json", APP);
    let project = load_dirs([tree.path("app")], "json").unwrap();

    // `point` is a `use` of an interface in a package that was never loaded.
    let err = project.find_type("ns:app/canvas.point").unwrap_err();
    assert!(err.is_resolve());
    let message = err.to_string();
    assert!(message.contains("shapes"), "{message}");
    assert!(message.contains("ns:geo@1.0.0"), "{message}");
}

#[test]
fn test_unknown_type_attempts_are_recorded() {
    let (_tree, project) = geo_and_app();
    let err = project.find_type("ns:geo/shapes.triangle@1.0.0").unwrap_err();
    match err {
        Error::Resolve(ResolveError::UnresolvedType { name, attempts, .. }) => {
            assert_eq!(name, "triangle");
            assert!(!attempts.is_empty());
        }
        other => panic!("expected unresolved type, got {other:?}"),
    }
}

#[test]
fn test_world_functions_with_resources() {
    let (_tree, project) = geo_and_app();
    let functions = project.world_functions("ns:app/painter").unwrap();
    let names: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "blank",
            "describe",
            "[constructor]surface",
            "[method]surface.draw",
            "[method]surface.title",
            "[resource-drop]surface",
            "log",
            "run",
        ]
    );
    let canvas = functions.first().unwrap();
    assert_eq!(canvas.module.as_deref(), Some("ns:app/canvas"));
    let run = functions.last().unwrap();
    assert_eq!(run.direction, Direction::Export);
    assert_eq!(run.module, None);

    // draw(self, path: list<point>, with: paint) -> i32, i32, i32, i32
    let draw = functions
        .iter()
        .find(|f| f.name == "[method]surface.draw")
        .unwrap();
    let sig = project.abi().function_abi(draw.func).unwrap();
    assert_eq!(sig.flat_params, vec![CoreType::I32; 4]);
    assert!(!sig.spill_params);
    assert!(!sig.params_transfer_handles);

    let blank = functions.first().unwrap();
    let sig = project.abi().function_abi(blank.func).unwrap();
    assert!(sig.results_transfer_handles);
    assert_eq!(sig.core_results, vec![CoreType::I32]);
}
