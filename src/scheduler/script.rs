use super::shell_quote;
use crate::models::{DataObject, ProcessSpec, ResourceManagerKind};
use std::fmt::Write as _;

/// Batch script submitted by the JOB_SUBMISSION task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScript {
    job_name: String,
    contents: String,
}

impl JobScript {
    /// Render the script for the process's resource manager
    pub fn render(spec: &ProcessSpec) -> Self {
        let job_name = spec.job_name();
        let mut out = String::from("#!/bin/bash\n");

        for directive in directives(spec, &job_name) {
            let _ = writeln!(out, "{directive}");
        }
        out.push('\n');

        if spec.resource_manager() == ResourceManagerKind::Local {
            let _ = writeln!(
                out,
                "exec >{} 2>{}",
                shell_quote(&spec.stdout_path()),
                shell_quote(&spec.stderr_path())
            );
        }
        let _ = writeln!(out, "cd {} || exit 1", shell_quote(&spec.working_directory));

        for module in &spec.application.module_loads {
            let _ = writeln!(out, "module load {}", shell_quote(module));
        }
        for (key, value) in &spec.application.environment {
            let _ = writeln!(out, "export {key}={}", shell_quote(value));
        }
        for command in &spec.application.pre_job_commands {
            let _ = writeln!(out, "{command}");
        }

        let _ = writeln!(out, "{}", command_line(spec));

        for command in &spec.application.post_job_commands {
            let _ = writeln!(out, "{command}");
        }

        Self {
            job_name,
            contents: out,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn file_name(&self) -> String {
        format!("{}.sh", self.job_name)
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }
}

/// Executable, fixed arguments, then inputs in command-line order
fn command_line(spec: &ProcessSpec) -> String {
    let mut parts = vec![shell_quote(&spec.application.executable)];
    parts.extend(spec.application.arguments.iter().map(|a| shell_quote(a)));

    let mut ordered: Vec<&DataObject> = spec
        .inputs
        .iter()
        .filter(|i| i.command_line_order.is_some())
        .collect();
    ordered.sort_by_key(|i| i.command_line_order);

    for input in ordered {
        for value in input.values() {
            let arg = if input.data_type.requires_movement() {
                spec.staged_path(&value)
            } else {
                value
            };
            parts.push(shell_quote(&arg));
        }
    }

    parts.join(" ")
}

fn wall_time_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn directives(spec: &ProcessSpec, job_name: &str) -> Vec<String> {
    let s = &spec.scheduling;
    let stdout = spec.stdout_path();
    let stderr = spec.stderr_path();
    let mut d = Vec::new();

    match spec.resource_manager() {
        ResourceManagerKind::Slurm => {
            d.push(format!("#SBATCH -J {job_name}"));
            if let Some(q) = &s.queue_name {
                d.push(format!("#SBATCH -p {q}"));
            }
            d.push(format!("#SBATCH -N {}", s.node_count));
            d.push(format!("#SBATCH --ntasks={}", s.cpu_count));
            d.push(format!("#SBATCH -t {}:00", wall_time_hhmm(s.wall_time_minutes)));
            if let Some(mem) = s.total_memory_mb {
                d.push(format!("#SBATCH --mem={mem}M"));
            }
            if let Some(account) = &s.account {
                d.push(format!("#SBATCH -A {account}"));
            }
            d.push(format!("#SBATCH -o {stdout}"));
            d.push(format!("#SBATCH -e {stderr}"));
            if let Some(email) = &spec.notification_email {
                d.push(format!("#SBATCH --mail-user={email}"));
                d.push("#SBATCH --mail-type=ALL".to_string());
            }
        }
        ResourceManagerKind::Pbs => {
            let ppn = s.cpu_count.div_ceil(s.node_count.max(1));
            d.push(format!("#PBS -N {job_name}"));
            if let Some(q) = &s.queue_name {
                d.push(format!("#PBS -q {q}"));
            }
            d.push(format!("#PBS -l nodes={}:ppn={ppn}", s.node_count));
            d.push(format!("#PBS -l walltime={}:00", wall_time_hhmm(s.wall_time_minutes)));
            if let Some(mem) = s.total_memory_mb {
                d.push(format!("#PBS -l mem={mem}mb"));
            }
            if let Some(account) = &s.account {
                d.push(format!("#PBS -A {account}"));
            }
            d.push(format!("#PBS -o {stdout}"));
            d.push(format!("#PBS -e {stderr}"));
            if let Some(email) = &spec.notification_email {
                d.push(format!("#PBS -M {email}"));
                d.push("#PBS -m abe".to_string());
            }
        }
        ResourceManagerKind::Lsf => {
            d.push(format!("#BSUB -J {job_name}"));
            if let Some(q) = &s.queue_name {
                d.push(format!("#BSUB -q {q}"));
            }
            d.push(format!("#BSUB -n {}", s.cpu_count));
            d.push(format!("#BSUB -R \"span[hosts={}]\"", s.node_count));
            d.push(format!("#BSUB -W {}", wall_time_hhmm(s.wall_time_minutes)));
            if let Some(mem) = s.total_memory_mb {
                d.push(format!("#BSUB -M {mem}"));
            }
            if let Some(account) = &s.account {
                d.push(format!("#BSUB -P {account}"));
            }
            d.push(format!("#BSUB -o {stdout}"));
            d.push(format!("#BSUB -e {stderr}"));
            if let Some(email) = &spec.notification_email {
                d.push(format!("#BSUB -u {email}"));
                d.push("#BSUB -B".to_string());
                d.push("#BSUB -N".to_string());
            }
        }
        ResourceManagerKind::Uge => {
            d.push(format!("#$ -N {job_name}"));
            d.push("#$ -S /bin/bash".to_string());
            if let Some(q) = &s.queue_name {
                d.push(format!("#$ -q {q}"));
            }
            d.push(format!("#$ -pe smp {}", s.cpu_count));
            d.push(format!("#$ -l h_rt={}:00", wall_time_hhmm(s.wall_time_minutes)));
            if let Some(mem) = s.total_memory_mb {
                d.push(format!("#$ -l h_vmem={mem}M"));
            }
            if let Some(account) = &s.account {
                d.push(format!("#$ -A {account}"));
            }
            d.push(format!("#$ -o {stdout}"));
            d.push(format!("#$ -e {stderr}"));
            if let Some(email) = &spec.notification_email {
                d.push(format!("#$ -M {email}"));
                d.push("#$ -m beas".to_string());
            }
        }
        ResourceManagerKind::Local => {}
    }

    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApplicationSpec, ComputeResource, DataType, JobSubmissionProtocol, ResourceScheduling,
    };

    fn spec(kind: ResourceManagerKind) -> ProcessSpec {
        ProcessSpec {
            process_id: "PROC_1".into(),
            experiment_id: "EXP_1".into(),
            gateway_id: "gw".into(),
            user_id: "alice".into(),
            compute_resource: ComputeResource {
                resource_id: "cluster".into(),
                host: "login.example.org".into(),
                port: 22,
                resource_manager: kind,
                protocol: JobSubmissionProtocol::Ssh,
                max_wall_time_minutes: None,
            },
            credential_token: "tok".into(),
            working_directory: "/scratch/alice/PROC_1".into(),
            storage_directory: "/gateway/PROC_1".into(),
            scheduling: ResourceScheduling {
                node_count: 2,
                cpu_count: 48,
                queue_name: Some("compute".into()),
                wall_time_minutes: 90,
                total_memory_mb: Some(4096),
                account: None,
            },
            application: ApplicationSpec {
                executable: "/apps/gromacs/bin/gmx".into(),
                arguments: vec!["mdrun".into()],
                module_loads: vec!["gromacs/2024".into()],
                environment: [("OMP_NUM_THREADS".to_string(), "4".to_string())]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
            inputs: vec![DataObject {
                command_line_order: Some(1),
                ..DataObject::input("structure", "/gateway/in/protein.pdb", DataType::Uri)
            }],
            outputs: vec![],
            notification_email: Some("alice@example.org".into()),
            cleanup_working_directory: false,
        }
    }

    #[test]
    fn test_slurm_script() {
        let script = JobScript::render(&spec(ResourceManagerKind::Slurm));
        let text = script.contents();
        assert!(text.starts_with("#!/bin/bash\n"));
        assert!(text.contains(&format!("#SBATCH -J {}", script.job_name())));
        assert!(text.contains("#SBATCH -p compute"));
        assert!(text.contains("#SBATCH -t 01:30:00"));
        assert!(text.contains("#SBATCH --mem=4096M"));
        assert!(text.contains("#SBATCH --mail-type=ALL"));
        assert!(text.contains("module load gromacs/2024"));
        assert!(text.contains("export OMP_NUM_THREADS=4"));
        assert!(text.contains(
            "/apps/gromacs/bin/gmx mdrun /scratch/alice/PROC_1/protein.pdb"
        ));
        assert_eq!(script.file_name(), format!("{}.sh", script.job_name()));
    }

    #[test]
    fn test_pbs_and_uge_directives() {
        let pbs = JobScript::render(&spec(ResourceManagerKind::Pbs));
        assert!(pbs.contents().contains("#PBS -l nodes=2:ppn=24"));
        assert!(pbs.contents().contains("#PBS -l walltime=01:30:00"));

        let uge = JobScript::render(&spec(ResourceManagerKind::Uge));
        assert!(uge.contents().contains("#$ -pe smp 48"));
        assert!(uge.contents().contains("#$ -l h_rt=01:30:00"));
    }

    #[test]
    fn test_local_script_redirects_output() {
        let s = spec(ResourceManagerKind::Local);
        let script = JobScript::render(&s);
        assert!(!script.contents().contains("#SBATCH"));
        assert!(script
            .contents()
            .contains(&format!("exec >{} 2>{}", s.stdout_path(), s.stderr_path())));
    }
}
