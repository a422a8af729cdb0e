use std::path::PathBuf;

use blipserve_models::{DEFAULT_NLVR_CHECKPOINT, DEFAULT_VQA_CHECKPOINT};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "blipserve", version, about = "BLIP VQA/NLVR demo client and smoke runner")]
pub struct Cli {
    /// Log level (RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send requests to a running inference server over HTTP
    Demo {
        /// Server address (host:port or URL)
        #[arg(long, default_value = "localhost:8000")]
        url: String,

        #[command(subcommand)]
        task: DemoTask,
    },
    /// Load an adapter in-process and run one batch through it
    Smoke {
        /// Device for inference (cpu or cuda:N)
        #[arg(long, global = true, default_value = "cpu")]
        device: String,

        #[command(subcommand)]
        task: SmokeTask,
    },
}

#[derive(Subcommand, Debug)]
pub enum DemoTask {
    /// Image pairs plus statements; prints one verdict per pair
    Nlvr {
        #[arg(long, default_value = "blip_nlvr")]
        model: String,
        /// Left images (repeatable); defaults to the bundled demo pairs
        #[arg(long)]
        image0: Vec<String>,
        /// Right images (repeatable)
        #[arg(long)]
        image1: Vec<String>,
        /// Statements (repeatable)
        #[arg(long)]
        text: Vec<String>,
        /// Repeat the batch this many times
        #[arg(long, default_value_t = 1)]
        loop_size: usize,
        #[arg(long, default_value = "1")]
        request_id: String,
    },
    /// Images plus questions; prints one answer per image
    Vqa {
        #[arg(long, default_value = "blip_vqa")]
        model: String,
        #[arg(long)]
        image: Vec<String>,
        #[arg(long)]
        question: Vec<String>,
        #[arg(long, default_value_t = 1)]
        loop_size: usize,
        #[arg(long, default_value = "1")]
        request_id: String,
    },
    /// Ask whether a model is ready to serve
    Ready { model: String },
}

#[derive(Subcommand, Debug)]
pub enum SmokeTask {
    Vqa {
        #[arg(long, default_value = DEFAULT_VQA_CHECKPOINT)]
        checkpoint: PathBuf,
        #[arg(long)]
        image: Vec<String>,
        #[arg(long)]
        question: Vec<String>,
    },
    Nlvr {
        #[arg(long, default_value = DEFAULT_NLVR_CHECKPOINT)]
        checkpoint: PathBuf,
        #[arg(long)]
        image0: Vec<String>,
        #[arg(long)]
        image1: Vec<String>,
        #[arg(long)]
        text: Vec<String>,
    },
}
