use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const COMPOSE_YAML: &str = r#"services:
  web:
    image: nginx:alpine
    ports:
      - "80"
    healthcheck:
      test: ["CMD", "wget", "-q", "-O", "/dev/null", "http://localhost"]
      interval: 2s
      retries: 10
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        let path = self.root.path().join("dockyard.yaml");
        fs::write(path, content).unwrap();
    }

    pub fn write_compose(&self, name: &str, content: &str) {
        let path = self.root.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// プロジェクトディレクトリで実行する dockyard コマンド
    ///
    /// 利用者の環境変数やグローバル設定の影響を受けないようにする。
    #[allow(deprecated)]
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("dockyard").unwrap();
        cmd.current_dir(self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".xdg"))
            .env_remove("DOCKYARD_CONFIG_PATH")
            .env_remove("DOCKYARD_STACK")
            .env_remove("DOCKYARD_COMPOSE_FILES")
            .env_remove("DOCKYARD_STACK_NAME")
            .env_remove("DOCKYARD_LIFECYCLE");
        cmd
    }

    #[allow(dead_code)]
    pub fn docker_available() -> bool {
        std::process::Command::new("docker")
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}
