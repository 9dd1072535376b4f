#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ghdeploy_core::deployment::{DeploymentDescriptor, DeploymentService};
use ghdeploy_core::error::{DeployError, ExecFailure, Result};
use ghdeploy_core::exec::CommandExecutor;

enum Canned {
    Stdout(Vec<u8>),
    Exit { code: i32, stderr: String },
}

/// Executor that answers per program name with canned output.
#[derive(Default)]
pub struct FakeExecutor {
    canned: HashMap<String, Canned>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, program: &str, out: &str) -> Self {
        self.canned
            .insert(program.to_string(), Canned::Stdout(out.as_bytes().to_vec()));
        self
    }

    pub fn exit(mut self, program: &str, code: i32, stderr: &str) -> Self {
        self.canned.insert(
            program.to_string(),
            Canned::Exit {
                code,
                stderr: stderr.to_string(),
            },
        );
        self
    }

    /// Every invocation as `[program, args...]`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn run(
        &self,
        _cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls.lock().unwrap().push(call);

        match self.canned.get(program) {
            Some(Canned::Stdout(out)) => Ok(out.clone()),
            Some(Canned::Exit { code, stderr }) => Err(DeployError::exec(
                program,
                ExecFailure::Status {
                    code: Some(*code),
                    stderr: stderr.clone(),
                },
            )),
            None => Err(DeployError::exec(
                program,
                ExecFailure::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "program not found",
                )),
            )),
        }
    }
}

/// Service that records descriptors and hands out sequential ids.
#[derive(Default)]
pub struct FakeService {
    received: Mutex<Vec<DeploymentDescriptor>>,
    reject: Option<(u16, String)>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(status: u16, message: &str) -> Self {
        Self {
            received: Mutex::default(),
            reject: Some((status, message.to_string())),
        }
    }

    pub fn received(&self) -> Vec<DeploymentDescriptor> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeploymentService for FakeService {
    async fn create_deployment_settings(
        &self,
        _cancel: &CancellationToken,
        descriptor: DeploymentDescriptor,
    ) -> Result<String> {
        let mut received = self.received.lock().unwrap();
        received.push(descriptor);
        if let Some((status, message)) = &self.reject {
            return Err(DeployError::Service {
                status: Some(*status),
                message: message.clone(),
            });
        }
        Ok(format!("deployment-{}", received.len()))
    }
}

/// Create `root/.git` and the nested `dirs` below `root`.
pub fn checkout_with_dirs(root: &Path, dirs: &[&str]) {
    std::fs::create_dir_all(root.join(".git")).unwrap();
    for dir in dirs {
        std::fs::create_dir_all(root.join(dir)).unwrap();
    }
}

pub const ACME_REMOTE: &str = "https://github.com/acme/widget.git\n";
pub const DEVELOP_VIEW: &str = r#"{"defaultBranchRef":{"name":"develop"}}"#;
