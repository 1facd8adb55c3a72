// tests/config_loading.rs

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::{NamedTempFile, TempDir};

use dockdag::config::load_and_validate;
use dockdag::config::model::{ImageSource, PortMapping};
use dockdag::config::loader::load_and_validate_with;
use dockdag::errors::DockdagError;
use dockdag::fs::mock::MockFileSystem;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str) -> String {
    let file = config_file(contents);
    match load_and_validate(file.path()) {
        Err(DockdagError::ConfigError(msg)) => msg,
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_full_config_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dockdag.toml");
    std::fs::write(
        &path,
        r#"
project_name = "shop"

[container.database]
image = "postgres:16"
environment = { POSTGRES_PASSWORD = "pw" }
health_check = { command = "pg_isready", interval = "2s", retries = 10, start_period = "500ms", timeout = "1m" }

[container.app]
build_directory = "app"
command = ["./run.sh"]
working_directory = "/code"
dependencies = ["database"]
ports = ["8080:80"]

[task.test]
container = "app"
command = ["./test.sh"]
environment = { CI = "1" }
ports = ["9000:9000"]
description = "run the tests"
"#,
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.project_name, "shop");

    let app = &cfg.containers["app"];
    assert_eq!(
        app.image_source,
        ImageSource::Build {
            build_directory: dir.path().join("app"),
            dockerfile: "Dockerfile".to_string(),
        }
    );
    assert_eq!(app.command, Some(vec!["./run.sh".to_string()]));
    assert_eq!(app.working_directory.as_deref(), Some("/code"));
    assert!(app.dependencies.contains("database"));
    assert_eq!(
        app.port_mappings,
        vec![PortMapping {
            local: 8080,
            container: 80
        }]
    );

    let database = &cfg.containers["database"];
    assert_eq!(
        database.image_source,
        ImageSource::Pull {
            image_name: "postgres:16".to_string()
        }
    );
    assert_eq!(database.health_check.command.as_deref(), Some("pg_isready"));
    assert_eq!(database.health_check.interval, Some(Duration::from_secs(2)));
    assert_eq!(database.health_check.retries, Some(10));
    assert_eq!(
        database.health_check.start_period,
        Some(Duration::from_millis(500))
    );
    assert_eq!(database.health_check.timeout, Some(Duration::from_secs(60)));

    let task = &cfg.tasks["test"];
    assert_eq!(task.container, "app");
    assert_eq!(task.description.as_deref(), Some("run the tests"));
    assert_eq!(task.environment["CI"], "1");
}

#[test]
fn test_project_name_defaults_to_the_config_directory() {
    let fs = MockFileSystem::new();
    fs.add_file(
        "/work/My Shop/dockdag.toml",
        r#"
[container.tool]
image = "alpine:3"

[task.run]
container = "tool"
"#,
    );

    let cfg = load_and_validate_with(&fs, Path::new("/work/My Shop/dockdag.toml")).unwrap();

    assert_eq!(cfg.project_name, "my-shop");
}

#[test]
fn test_build_directory_is_resolved_against_the_config_file() {
    let fs = MockFileSystem::new();
    fs.add_file(
        "/work/shop/dockdag.toml",
        r#"
[container.app]
build_directory = "images/app"
dockerfile = "Dockerfile.dev"

[task.run]
container = "app"
"#,
    );

    let cfg = load_and_validate_with(&fs, Path::new("/work/shop/dockdag.toml")).unwrap();

    assert_eq!(
        cfg.containers["app"].image_source,
        ImageSource::Build {
            build_directory: PathBuf::from("/work/shop/images/app"),
            dockerfile: "Dockerfile.dev".to_string(),
        }
    );
}

#[test]
fn test_container_cycle_returns_structured_error() {
    let file = config_file(
        r#"
[container.a]
image = "a:1"
dependencies = ["b"]

[container.b]
image = "b:1"
dependencies = ["a"]

[task.run]
container = "a"
"#,
    );

    match load_and_validate(file.path()) {
        Err(DockdagError::DependencyCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains("'a'") || msg.contains("'b'"));
        }
        Err(e) => panic!("Expected DependencyCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_task_dependency_that_closes_a_cycle_is_rejected() {
    let file = config_file(
        r#"
[container.app]
image = "app:1"

[container.helper]
image = "helper:1"
dependencies = ["app"]

[task.run]
container = "app"
dependencies = ["helper"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(DockdagError::DependencyCycle(msg)) => {
            assert!(msg.contains("dependencies of task 'run' form a cycle"));
        }
        Err(e) => panic!("Expected DependencyCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_unknown_dependency_returns_config_error() {
    let msg = expect_config_error(
        r#"
[container.app]
image = "app:1"
dependencies = ["NonExistent"]

[task.run]
container = "app"
"#,
    );

    assert!(msg.contains("unknown dependency"));
    assert!(msg.contains("NonExistent"));
}

#[test]
fn test_self_dependency_is_rejected() {
    let msg = expect_config_error(
        r#"
[container.app]
image = "app:1"
dependencies = ["app"]

[task.run]
container = "app"
"#,
    );

    assert!(msg.contains("cannot depend on itself"));
}

#[test]
fn test_image_and_build_directory_are_mutually_exclusive() {
    let both = expect_config_error(
        r#"
[container.app]
image = "app:1"
build_directory = "app"

[task.run]
container = "app"
"#,
    );
    assert!(both.contains("must not specify both"));

    let neither = expect_config_error(
        r#"
[container.app]
command = ["true"]

[task.run]
container = "app"
"#,
    );
    assert!(neither.contains("must specify either"));
}

#[test]
fn test_task_with_unknown_container_is_rejected() {
    let msg = expect_config_error(
        r#"
[container.app]
image = "app:1"

[task.run]
container = "ghost"
"#,
    );

    assert!(msg.contains("unknown container 'ghost'"));
}

#[test]
fn test_task_listing_its_own_container_as_dependency_is_rejected() {
    let msg = expect_config_error(
        r#"
[container.app]
image = "app:1"

[task.run]
container = "app"
dependencies = ["app"]
"#,
    );

    assert!(msg.contains("lists its own container 'app'"));
}

#[test]
fn test_malformed_port_mapping_is_rejected() {
    let msg = expect_config_error(
        r#"
[container.app]
image = "app:1"
ports = ["80"]

[task.run]
container = "app"
"#,
    );

    assert!(msg.contains("container 'app'"));
    assert!(msg.contains("local:container"));
}

#[test]
fn test_malformed_health_check_duration_is_rejected() {
    let msg = expect_config_error(
        r#"
[container.db]
image = "postgres:16"
health_check = { command = "pg_isready", interval = "soon" }

[task.run]
container = "db"
"#,
    );

    assert!(msg.contains("health_check.interval"));
}

#[test]
fn test_invalid_container_name_is_rejected() {
    let msg = expect_config_error(
        r#"
[container."-app"]
image = "app:1"

[task.run]
container = "-app"
"#,
    );

    assert!(msg.contains("invalid container name '-app'"));
}

#[test]
fn test_config_without_tasks_is_rejected() {
    let msg = expect_config_error(
        r#"
[container.app]
image = "app:1"
"#,
    );

    assert!(msg.contains("at least one [task.<name>]"));
}

#[test]
fn test_unknown_keys_are_a_toml_error() {
    let file = config_file(
        r#"
[container.app]
image = "app:1"
entrypoint = "sh"

[task.run]
container = "app"
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(DockdagError::TomlError(_))
    ));
}

#[test]
fn test_missing_config_file_is_reported() {
    let fs = MockFileSystem::new();

    match load_and_validate_with(&fs, Path::new("/work/shop/dockdag.toml")) {
        Err(DockdagError::ConfigError(msg)) => {
            assert!(msg.contains("/work/shop/dockdag.toml"));
            assert!(msg.contains("does not exist"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_project_name_must_be_usable_in_image_tags() {
    let msg = expect_config_error(
        r#"
project_name = "Shop"

[container.web]
build_directory = "web"

[task.run]
container = "web"
"#,
    );

    assert!(msg.contains("invalid project name 'Shop'"));
    assert!(msg.contains("lowercase"));
}

#[test]
fn test_containers_that_build_images_need_lowercase_names() {
    let msg = expect_config_error(
        r#"
project_name = "shop"

[container.Web]
build_directory = "web"

[task.run]
container = "Web"
"#,
    );
    assert!(msg.contains("invalid container name 'Web'"));
    assert!(msg.contains("builds an image"));

    // Pulled images keep their own name, so the container name is free.
    let file = config_file(
        r#"
project_name = "shop"

[container.Web]
image = "nginx:1"

[task.run]
container = "Web"
"#,
    );
    assert!(load_and_validate(file.path()).is_ok());
}

#[test]
fn test_defaulted_project_name_is_a_valid_image_name() {
    let fs = MockFileSystem::new();
    fs.add_file(
        "/work/Shop (old)/dockdag.toml",
        r#"
[container.app]
build_directory = "app"

[task.run]
container = "app"
"#,
    );

    let cfg = load_and_validate_with(&fs, Path::new("/work/Shop (old)/dockdag.toml")).unwrap();

    assert_eq!(cfg.project_name, "shop--old");
}

#[test]
fn test_oversized_health_check_duration_is_rejected() {
    let msg = expect_config_error(
        r#"
[container.db]
image = "postgres:16"
health_check = { command = "pg_isready", interval = "9999999999999999h" }

[task.run]
container = "db"
"#,
    );

    assert!(msg.contains("health_check.interval"));
    assert!(msg.contains("too large"));
}

#[test]
fn test_environment_values_with_line_breaks_are_rejected() {
    let container = expect_config_error(
        r#"
[container.app]
image = "app:1"
environment = { GREETING = "hello\nINJECTED=1" }

[task.run]
container = "app"
"#,
    );
    assert!(container.contains("environment variable 'GREETING' of container 'app'"));
    assert!(container.contains("line break"));

    let task = expect_config_error(
        r#"
[container.app]
image = "app:1"

[task.run]
container = "app"
environment = { "A=B" = "1" }
"#,
    );
    assert!(task.contains("task 'run' has invalid environment variable name 'A=B'"));
}

#[cfg(unix)]
#[test]
fn test_project_name_is_resolved_through_the_given_filesystem() {
    // On disk `linked-shop` points at `real-shop`; the in-memory filesystem
    // knows nothing about that link.
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("real-shop")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("real-shop"), dir.path().join("linked-shop"))
        .unwrap();

    let config_path = dir.path().join("linked-shop").join("dockdag.toml");
    let fs = MockFileSystem::new();
    fs.add_file(
        &config_path,
        r#"
[container.tool]
image = "alpine:3"

[task.run]
container = "tool"
"#,
    );

    let cfg = load_and_validate_with(&fs, &config_path).unwrap();

    assert_eq!(cfg.project_name, "linked-shop");
}
