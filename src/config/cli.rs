use crate::core::bulk::BulkOperation;
use crate::domain::model::Placement;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "small-roster")]
#[command(about = "Manage which students are enrolled in a subject's levels and groups")]
pub struct CliConfig {
    #[arg(short, long, default_value = "roster.toml", help = "Path to TOML configuration file")]
    pub config: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Print results as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    #[arg(long)]
    pub subject: String,

    #[arg(long)]
    pub level: String,

    #[arg(long)]
    pub group: String,
}

impl TargetArgs {
    pub fn placement(&self) -> Placement {
        Placement::new(self.level.clone(), self.group.clone())
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show the current roster of a subject
    Roster {
        #[arg(long)]
        subject: String,

        #[arg(long, help = "List active students not yet enrolled instead")]
        available: bool,
    },

    /// Enroll students into a level and group
    Enroll {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, default_value = "", help = "Audit note stored with the change")]
        note: String,

        #[arg(required = true)]
        students: Vec<String>,
    },

    /// Move enrolled students to another level and group
    Transfer {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, default_value = "")]
        note: String,

        #[arg(required = true)]
        students: Vec<String>,
    },

    /// Remove students from a subject
    Remove {
        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "")]
        note: String,

        #[arg(required = true)]
        students: Vec<String>,
    },

    /// List the groups of a level that still have free seats
    Groups {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        level: String,
    },

    /// Compare capacity counters against the enrollments
    Check {
        #[arg(long)]
        subject: String,
    },
}

impl Command {
    /// 批次指令對應的 (操作, 科目, 學生, 備註)
    pub fn bulk_request(&self) -> Option<(BulkOperation, &str, &[String], &str)> {
        match self {
            Command::Enroll {
                target,
                note,
                students,
            } => Some((
                BulkOperation::Enroll(target.placement()),
                target.subject.as_str(),
                students.as_slice(),
                note.as_str(),
            )),
            Command::Transfer {
                target,
                note,
                students,
            } => Some((
                BulkOperation::Transfer(target.placement()),
                target.subject.as_str(),
                students.as_slice(),
                note.as_str(),
            )),
            Command::Remove {
                subject,
                note,
                students,
            } => Some((
                BulkOperation::Remove,
                subject.as_str(),
                students.as_slice(),
                note.as_str(),
            )),
            Command::Roster { .. } | Command::Groups { .. } | Command::Check { .. } => None,
        }
    }
}
