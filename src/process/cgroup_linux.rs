use std::{
    process::Child,
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use cgroups_rs::Cgroup;
use tracing::warn;

/// Maximum number of pids a contained bot may own.
const MAX_PIDS: i64 = 100;

fn get_current_user_id() -> anyhow::Result<String> {
    let output = std::process::Command::new("id")
        .arg("-u")
        .output()
        .context("Could not launch 'id -u'")?;
    let untrimmed_id = std::str::from_utf8(&output.stdout).context("id is not a valid string")?;
    Ok(untrimmed_id.trim().to_string())
}

fn get_cgroup_path(user_id: &str, group_name: &str) -> String {
    format!("user.slice/user-{user_id}.slice/user@{user_id}.service/{group_name}")
}

/// Create a cgroup at `path`. Non-positive limits and an empty cpu list
/// mean no restriction.
fn create_cgroup(path: &str, max_memory: i64, max_pids: i64, cpus: &str) -> anyhow::Result<Cgroup> {
    let mut builder = cgroups_rs::cgroup_builder::CgroupBuilder::new(path);
    if max_memory > 0 {
        builder = builder.memory().memory_hard_limit(max_memory).done();
    }
    if max_pids > 0 {
        builder = builder
            .pid()
            .maximum_number_of_processes(cgroups_rs::MaxValue::Value(max_pids))
            .done();
    }
    if !cpus.is_empty() {
        builder = builder.cpu().cpus(cpus.to_string()).done();
    }
    builder
        .build(cgroups_rs::hierarchies::auto())
        .context("could not create cgroup")
}

fn wait_for_process_cleanup(cgroup: &Cgroup, pid: u64, max_duration: Duration) -> anyhow::Result<()> {
    let deadline = Instant::now() + max_duration;
    while cgroup.tasks().iter().any(|cpid| cpid.pid == pid) {
        if Instant::now() > deadline {
            bail!("process {pid} still in its cgroup after {max_duration:?}");
        }
        std::thread::sleep(std::cmp::min(Duration::from_millis(10), max_duration / 10));
    }
    Ok(())
}

/// A cgroup holding exactly one bot process.
#[derive(Debug)]
pub struct Container(Cgroup);

impl Container {
    pub fn create(max_memory: i64, cpus: &str) -> anyhow::Result<Container> {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        let user_id = get_current_user_id().context("could not get user id")?;
        let group_name = format!(
            "COLOSSEUM_BOT_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = get_cgroup_path(&user_id, &group_name);
        create_cgroup(&path, max_memory, MAX_PIDS, cpus).map(Container)
    }

    pub fn add(&self, child: &Child) -> anyhow::Result<()> {
        self.0
            .add_task_by_tgid(cgroups_rs::CgroupPid {
                pid: child.id() as u64,
            })
            .context("could not add task to cgroup")
    }

    pub fn kill(&mut self, pid: u64, max_duration: Duration) -> anyhow::Result<()> {
        self.0.kill().context("could not kill cgroup")?;
        wait_for_process_cleanup(&self.0, pid, max_duration).context("process cleanup timed out")
    }

    pub fn delete(self) {
        if let Err(e) = self.0.delete() {
            warn!("Failed to remove cgroup. If this happens a lot, it may slow down the computer. {e}");
        }
    }
}
