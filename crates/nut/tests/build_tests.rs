//! Integration tests for the image builder, run against a mock driver.

mod common;

use std::fs;
use std::path::PathBuf;

use common::MockDriver;
use nut::exec::{EXEC_CWD, SCRIPT_PATH};
use nut::{BuildState, Builder, Directive, Manifest, Script};
use nut_common::{ContainerName, NutError};
use nut_driver::{ContainerStatus, VolumeSpec};

fn builder(driver: MockDriver) -> Builder<MockDriver> {
    let options = driver.options();
    Builder::with_options(ContainerName::new("web").unwrap(), driver, options)
}

fn script(text: &str) -> Script {
    Script::parse_str(text).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_build_writes_manifest() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let manifest = builder
        .build(&script("FROM base\nENV X=1\nWORKDIR /srv\nCMD [\"run\"]\n"))
        .await
        .unwrap();

    let expected = Manifest {
        env: vec!["X=1".to_string()],
        work_dir: Some("/srv".to_string()),
        entry_point: vec!["run".to_string()],
        ..Manifest::default()
    };
    assert_eq!(manifest, expected);

    let path = builder.driver().paths().container_manifest("web");
    assert_eq!(Manifest::load(&path).unwrap(), expected);

    let log = builder.driver().log();
    assert_eq!(log.clones.len(), 1);
    assert_eq!(log.clones[0].base, "base");
    assert_eq!(log.clones[0].name, "web");
}

#[tokio::test]
async fn test_image_reference_is_resolved() {
    let driver = MockDriver::new();
    driver.base("library-ubuntu-22.04");
    let mut builder = builder(driver);

    builder
        .build(&script("FROM library/ubuntu:22.04\n"))
        .await
        .unwrap();

    assert_eq!(
        builder.driver().log().clones[0].base,
        "library-ubuntu-22.04"
    );
}

#[tokio::test]
async fn test_second_from_fails_before_anything_runs() {
    let driver = MockDriver::new();
    driver.base("base");
    driver.base("other");
    let mut builder = builder(driver);

    let err = builder
        .build(&script("FROM base\nRUN echo hi\nFROM other\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, NutError::DuplicateFrom));
    let log = builder.driver().log();
    assert!(log.clones.is_empty());
    assert!(log.scripts.is_empty());
}

#[tokio::test]
async fn test_from_twice_through_apply() {
    let driver = MockDriver::new();
    driver.base("base");
    let builder = builder(driver);
    let from = Directive::From {
        image: "base".to_string(),
    };

    let state = builder.apply(BuildState::new(), &from).await.unwrap();
    let halted = builder.apply(state, &from).await.unwrap_err();

    assert_eq!(halted.directive, "FROM");
    assert!(matches!(halted.error, NutError::DuplicateFrom));
    assert!(halted.state.container.is_some());
    assert_eq!(builder.driver().log().clones.len(), 1);
}

#[tokio::test]
async fn test_cmd_and_entrypoint_conflict_in_either_order() {
    for text in [
        "FROM base\nCMD a\nENTRYPOINT b\nRUN never\n",
        "FROM base\nENTRYPOINT a\nCMD b\nRUN never\n",
    ] {
        let driver = MockDriver::new();
        driver.base("base");
        let mut builder = builder(driver);

        let err = builder.build(&script(text)).await.unwrap_err();

        assert!(matches!(err, NutError::DuplicateEntrypoint), "{text}");
        assert_eq!(builder.state().unwrap().manifest.entry_point, ["a"]);
        assert!(builder.driver().log().scripts.is_empty());
    }
}

#[tokio::test]
async fn test_base_entrypoint_can_be_overridden() {
    let driver = MockDriver::new();
    driver.base("base");
    let inherited = Manifest {
        env: vec!["LANG=C.UTF-8".to_string()],
        work_dir: Some("/opt".to_string()),
        entry_point: vec!["/bin/sh".to_string()],
        ..Manifest::default()
    };
    inherited
        .save(&driver.paths().container_manifest("base"))
        .unwrap();
    let mut builder = builder(driver);

    let manifest = builder
        .build(&script("FROM base\nENV X=1\nRUN make\nCMD [\"run\"]\n"))
        .await
        .unwrap();

    assert_eq!(manifest.env, ["LANG=C.UTF-8", "X=1"]);
    assert_eq!(manifest.work_dir.as_deref(), Some("/opt"));
    assert_eq!(manifest.entry_point, ["run"]);
    assert_eq!(
        builder.driver().log().scripts[0],
        "#!/bin/bash\nexport LANG=C.UTF-8\nexport X=1\ncd /opt\nmake"
    );
}

#[tokio::test]
async fn test_env_pairs_are_exported() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let manifest = builder
        .build(&script("FROM base\nENV A=1 B 2\nRUN env\n"))
        .await
        .unwrap();

    assert_eq!(manifest.env, ["A=1", "B=2"]);
    let log = builder.driver().log();
    assert_eq!(log.scripts[0], "#!/bin/bash\nexport A=1\nexport B=2\nenv");
    assert_eq!(log.argv[0], ["/bin/bash", SCRIPT_PATH]);
    assert_eq!(log.attach[0].cwd.as_deref(), Some(EXEC_CWD));
    assert!(log.attach[0].clear_env);
}

#[tokio::test]
async fn test_workdir_and_user_apply_to_later_commands() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let manifest = builder
        .build(&script(
            "FROM base\nRUN id\nWORKDIR /srv\nUSER app\nRUN ls -la\n",
        ))
        .await
        .unwrap();

    assert_eq!(manifest.user.as_deref(), Some("app"));
    let log = builder.driver().log();
    assert_eq!(log.scripts[0], "#!/bin/bash\nid");
    assert_eq!(log.scripts[1], "#!/bin/bash\ncd /srv\nsu - app\nls -la");
}

#[tokio::test]
async fn test_failed_command_keeps_container() {
    let driver = MockDriver::failing_on("make");
    driver.base("base");
    let mut builder = builder(driver);

    let err = builder
        .build(&script("FROM base\nRUN make install\nRUN never\n"))
        .await
        .unwrap_err();

    match err {
        NutError::CommandFailed { command, exit_code } => {
            assert_eq!(command, "make install");
            assert_eq!(exit_code, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(builder.driver().log().scripts.len(), 1);
    assert!(builder.state().unwrap().container.is_some());

    builder.destroy().await.unwrap();
    assert!(!builder.driver().rootfs_of("web").exists());
}

#[tokio::test]
async fn test_run_before_from() {
    let driver = MockDriver::new();
    let mut builder = builder(driver);

    let err = builder.build(&script("RUN echo hi\n")).await.unwrap_err();

    assert!(matches!(err, NutError::NoContainer { .. }));
    assert!(builder.driver().log().scripts.is_empty());
}

#[tokio::test]
async fn test_metadata_only_script_has_no_container() {
    let mut builder = builder(MockDriver::new());

    let err = builder
        .build(&script("ENV A=1\nLABEL tier=web\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, NutError::NoContainer { .. }));
    assert_eq!(builder.state().unwrap().manifest.env, ["A=1"]);
}

#[tokio::test]
async fn test_unknown_directive_fails_before_clone() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let err = builder
        .build(&script("FROM base\nHEALTHCHECK none\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, NutError::UnknownDirective { line: 2, .. }));
    assert!(builder.driver().log().clones.is_empty());
    assert!(builder.state().is_none());
}

#[tokio::test]
async fn test_invalid_label_halts_with_state() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let err = builder
        .build(&script("FROM base\nLABEL a=1 broken\nRUN never\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, NutError::InvalidLabel { ref label } if label == "broken"));
    let state = builder.state().unwrap();
    assert_eq!(state.manifest.labels.get("a").map(String::as_str), Some("1"));
    assert!(builder.driver().log().scripts.is_empty());
}

#[tokio::test]
async fn test_label_value_keeps_later_equals() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let manifest = builder
        .build(&script("FROM base\nLABEL opts=a=b tier=web\n"))
        .await
        .unwrap();

    assert_eq!(manifest.labels["opts"], "a=b");
    assert_eq!(manifest.labels["tier"], "web");
}

#[tokio::test]
async fn test_bad_ports_are_skipped() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let manifest = builder
        .build(&script("FROM base\nEXPOSE 80 not-a-number 443\nEXPOSE 80 70000\n"))
        .await
        .unwrap();

    assert_eq!(manifest.exposed_ports, [80, 443]);
}

#[tokio::test]
async fn test_ignored_directives() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let manifest = builder
        .build(&script(
            "FROM base\nMAINTAINER ops@example.com\nVOLUME /data\nSTOPSIGNAL SIGTERM\n",
        ))
        .await
        .unwrap();

    assert_eq!(manifest.maintainers, ["ops@example.com"]);
    assert!(builder.driver().log().scripts.is_empty());
}

#[tokio::test]
async fn test_add_stages_through_tmp() {
    let driver = MockDriver::new();
    driver.base("base");
    let host = tempfile::tempdir().unwrap();
    let src = host.path().join("app");
    fs::create_dir_all(src.join("bin")).unwrap();
    fs::write(src.join("bin/server"), "#!/bin/sh\n").unwrap();
    fs::write(host.path().join("app.conf"), "port=80").unwrap();
    let mut builder = builder(driver);

    let text = format!(
        "FROM base\nADD {} /opt/app\nCOPY {} /etc/app.conf\n",
        src.display(),
        host.path().join("app.conf").display()
    );
    builder.build(&script(&text)).await.unwrap();

    let rootfs = builder.driver().rootfs_of("web");
    assert_eq!(
        fs::read_to_string(rootfs.join("opt/app/bin/server")).unwrap(),
        "#!/bin/sh\n"
    );
    assert_eq!(
        fs::read_to_string(rootfs.join("etc/app.conf")).unwrap(),
        "port=80"
    );
    assert!(!rootfs.join("tmp/app").exists());
    assert!(!rootfs.join("tmp/app.conf").exists());

    let log = builder.driver().log();
    assert!(log.scripts[0].ends_with("cp -r /tmp/app /opt/app"));
    assert!(log.scripts[1].ends_with("cp -r /tmp/app.conf /etc/app.conf"));
}

#[tokio::test]
async fn test_add_missing_source() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let err = builder
        .build(&script("FROM base\nADD /definitely/not/here /opt\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, NutError::Copy { .. }));
    assert!(builder.driver().log().scripts.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_artifacts_are_extracted() {
    let driver = MockDriver::new();
    let base = driver.base("base");
    fs::create_dir_all(base.join("data/out")).unwrap();
    fs::write(base.join("data/out/report.txt"), "ok").unwrap();
    let out = driver.lxc_path().join("artifacts");
    let mut builder = builder(driver);

    let manifest = builder
        .build(&script("FROM base\nLABEL nut_artifact_x=/data/out tier=web\n"))
        .await
        .unwrap();

    assert_eq!(manifest.labels["nut_artifact_x"], "/data/out");
    assert_eq!(
        fs::read_to_string(out.join("out/report.txt")).unwrap(),
        "ok"
    );
    assert!(
        builder.driver().log().scripts[0].ends_with("cp -r /data/out /tmp/out"),
        "artifact staged through /tmp"
    );
}

#[tokio::test]
async fn test_missing_artifact_fails_build() {
    let driver = MockDriver::new();
    driver.base("base");
    let mut builder = builder(driver);

    let err = builder
        .build(&script("FROM base\nLABEL nut_artifact_x=/data/missing\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, NutError::CommandFailed { .. }));
    assert!(!builder.driver().paths().container_manifest("web").exists());
}

#[tokio::test]
async fn test_artifact_host_copy_failure_is_tolerated() {
    let driver = MockDriver::new();
    let base = driver.base("base");
    fs::create_dir_all(base.join("data/out")).unwrap();
    fs::write(base.join("data/out/report.txt"), "ok").unwrap();

    // A regular file where the artifact directory should be.
    let blocker = driver.lxc_path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let options = driver.options().with_artifact_dir(blocker.join("nested"));
    let mut builder =
        Builder::with_options(ContainerName::new("web").unwrap(), driver, options);

    builder
        .build(&script("FROM base\nLABEL nut_artifact_x=/data/out\n"))
        .await
        .unwrap();

    assert!(builder.driver().paths().container_manifest("web").exists());
}

#[tokio::test]
async fn test_volumes_are_attached() {
    let driver = MockDriver::new();
    driver.base("base");
    let cache: VolumeSpec = "/var/cache/apt:/var/cache/apt".parse().unwrap();
    let src: VolumeSpec = "/home/dev/src:/src".parse().unwrap();
    let options = driver
        .options()
        .with_volume(cache.clone())
        .with_volume(src.clone());
    let mut builder =
        Builder::with_options(ContainerName::new("web").unwrap(), driver, options);

    builder.build(&script("FROM base\n")).await.unwrap();

    let log = builder.driver().log();
    assert_eq!(log.starts[0].0, "web");
    assert_eq!(log.starts[0].1, [cache, src]);
}

#[tokio::test]
async fn test_lifecycle() {
    let driver = MockDriver::new();
    driver.base("base");
    let archive: PathBuf = driver.lxc_path().join("web.tar.gz");
    let mut builder = builder(driver);

    assert!(matches!(
        builder.stop().await.unwrap_err(),
        NutError::NoContainer { .. }
    ));

    builder.build(&script("FROM base\n")).await.unwrap();

    builder.stop().await.unwrap();
    assert_eq!(
        builder.driver().log().status["web"],
        ContainerStatus::Stopped
    );
    builder.stop().await.unwrap();

    builder.export(&archive, true).await.unwrap();
    assert_eq!(fs::read_to_string(&archive).unwrap(), "archive of web");
    assert_eq!(
        builder.driver().log().exports,
        [("web".to_string(), archive.clone(), true)]
    );

    builder.destroy().await.unwrap();
    assert!(matches!(
        builder.destroy().await.unwrap_err(),
        NutError::ContainerNotPresent { .. }
    ));
}

#[tokio::test]
async fn test_apply_threads_state() {
    let builder = builder(MockDriver::new());

    let state = builder
        .apply(
            BuildState::new(),
            &Directive::Env {
                vars: vec!["A=1".to_string()],
            },
        )
        .await
        .unwrap();
    let state = builder
        .apply(
            state,
            &Directive::Workdir {
                path: "/srv".to_string(),
            },
        )
        .await
        .unwrap();

    let halted = builder
        .apply(
            state,
            &Directive::Run {
                command: vec!["true".to_string()],
            },
        )
        .await
        .unwrap_err();

    assert_eq!(halted.directive, "RUN");
    assert!(matches!(halted.error, NutError::NoContainer { .. }));
    assert_eq!(halted.state.env, ["A=1"]);
    assert_eq!(halted.state.cwd.as_deref(), Some("/srv"));
}

#[tokio::test]
async fn test_missing_base_halts_without_container() {
    let mut builder = builder(MockDriver::new());

    let err = builder
        .build(&script("FROM nowhere\nRUN never\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, NutError::Driver { .. }));
    assert!(builder.state().unwrap().container.is_none());
    let log = builder.driver().log();
    assert!(log.clones.is_empty());
    assert!(log.scripts.is_empty());
}

#[tokio::test]
async fn test_clone_that_fails_to_start_is_destroyed() {
    let driver = MockDriver::failing_start();
    driver.base("base");
    let mut builder = builder(driver);

    let err = builder
        .build(&script("FROM base\nRUN never\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, NutError::Driver { ref operation, .. } if operation == "start"));
    assert!(builder.state().unwrap().container.is_none());
    assert!(!builder.driver().paths().container("web").exists());

    let log = builder.driver().log();
    assert_eq!(log.clones.len(), 1);
    assert!(!log.status.contains_key("web"));
    assert!(log.scripts.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_snapshot_manifest_is_inherited() {
    let driver = MockDriver::overlay();
    driver.base("base");
    let options = driver.options();

    let mut parent = Builder::with_options(
        ContainerName::new("web").unwrap(),
        driver.clone(),
        options.clone(),
    );
    parent
        .build(&script("FROM base\nENV X=1\nWORKDIR /srv\n"))
        .await
        .unwrap();
    assert!(
        driver
            .paths()
            .container("web")
            .join("overlay/manifest.yml")
            .exists()
    );

    let mut child = Builder::with_options(ContainerName::new("child").unwrap(), driver, options);
    let manifest = child
        .build(&script("FROM web\nRUN pwd\n"))
        .await
        .unwrap();

    assert_eq!(manifest.env, ["X=1"]);
    assert_eq!(manifest.work_dir.as_deref(), Some("/srv"));
    let log = child.driver().log();
    assert_eq!(log.scripts.last().unwrap(), "#!/bin/bash\nexport X=1\ncd /srv\npwd");
}
