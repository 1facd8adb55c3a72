#![allow(dead_code)]
#![allow(unused_imports)]

pub use dockdag_test_utils::builders;
pub use dockdag_test_utils::fake_runtime;
pub use dockdag_test_utils::recording_sink;
pub use dockdag_test_utils::simulation;
pub use dockdag_test_utils::{init_tracing, with_timeout};

use dockdag::config::ConfigFile;
use dockdag::runtime::{DockerContainer, DockerImage, DockerNetwork};

use self::builders::{ConfigFileBuilder, ContainerConfigBuilder, TaskConfigBuilder};

pub const NETWORK: &str = "testproject-network";

pub fn network() -> DockerNetwork {
    DockerNetwork::new(NETWORK)
}

pub fn image(name: &str) -> DockerImage {
    DockerImage::new(format!("sha256:{name}"))
}

pub fn docker_container(name: &str) -> DockerContainer {
    DockerContainer::new(format!("{name}-id"))
}

/// `app` (built from `./app`) runs the tests and depends on `db` (pulled,
/// with a health check).
pub fn app_with_database() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_container(
            "app",
            ContainerConfigBuilder::build_from("app")
                .depends_on("db")
                .command(&["./run.sh"])
                .build(),
        )
        .with_container(
            "db",
            ContainerConfigBuilder::pull("postgres:16")
                .env("POSTGRES_PASSWORD", "pw")
                .health_check("pg_isready")
                .build(),
        )
        .with_task(
            "test",
            TaskConfigBuilder::new("app")
                .command(&["./test.sh"])
                .env("CI", "1")
                .port("9000:9000")
                .build(),
        )
        .build()
}

/// `app` depends on both `db` and `cache`; neither has dependencies of its
/// own.
pub fn app_with_two_dependencies() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_container(
            "app",
            ContainerConfigBuilder::pull("shop-app:latest")
                .depends_on("db")
                .depends_on("cache")
                .build(),
        )
        .with_container("db", ContainerConfigBuilder::pull("postgres:16").build())
        .with_container("cache", ContainerConfigBuilder::pull("redis:7").build())
        .with_task("test", TaskConfigBuilder::new("app").build())
        .build()
}

/// A single container with nothing to wait for.
pub fn lone_container() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_container("tool", ContainerConfigBuilder::pull("alpine:3").build())
        .with_task("run", TaskConfigBuilder::new("tool").command(&["true"]).build())
        .build()
}
