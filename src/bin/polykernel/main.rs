//! polykernel CLI - inspect, clean and order polygon meshes.
//!
//! Usage: polykernel [-v] <COMMAND> <INPUT> [OUTPUT]
//!
//! Run `polykernel --help` for available commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{ArgAction, Parser, Subcommand};
use nalgebra::Point3;

use polykernel::algo::{clean_and_merge, BspOptions, BspTree, CancellationToken, CleanOptions, Progress};
use polykernel::io;
use polykernel::mesh::Mesh;

#[derive(Parser)]
#[command(name = "polykernel")]
#[command(author, version, about = "Polygon mesh kernel CLI", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,
    },

    /// Stitch a triangle soup into connected topology
    Clean {
        /// Input mesh file
        input: PathBuf,

        /// Output mesh file
        output: PathBuf,

        /// Merge vertices closer than this distance
        #[arg(short, long, default_value = "0.0")]
        epsilon: f64,
    },

    /// Print the back-to-front face order seen from an eye point
    Order {
        /// Input mesh file
        input: PathBuf,

        /// Eye position as x,y,z
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        eye: Point3<f64>,

        /// Candidate splitting faces sampled per BSP node
        #[arg(long, default_value = "16")]
        samples: usize,

        /// Take the first non-crossing splitter instead of the most balanced one
        #[arg(long)]
        unbalanced: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(level);
    if verbose == 0 {
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
    }
    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { input } => cmd_info(&input)?,
        Commands::Clean {
            input,
            output,
            epsilon,
        } => cmd_clean(&input, &output, epsilon)?,
        Commands::Order {
            input,
            eye,
            samples,
            unbalanced,
        } => cmd_order(&input, &eye, samples, unbalanced)?,
    }
    Ok(())
}

fn parse_point(s: &str) -> Result<Point3<f64>, String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|e| format!("{:?}: {}", c, e)))
        .collect::<Result<Vec<_>, _>>()?;
    match coords[..] {
        [x, y, z] => Ok(Point3::new(x, y, z)),
        _ => Err(format!("expected x,y,z, got {} values", coords.len())),
    }
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Only ever move forward
        let old = max_percent.fetch_max(raw_percent, Ordering::Relaxed);
        if raw_percent <= old && raw_percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (raw_percent * bar_width) / 100;
        eprint!(
            "\r[{}{}] {:3}% {:<24}",
            "=".repeat(filled),
            " ".repeat(bar_width - filled),
            raw_percent,
            message
        );
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mesh: Mesh = io::load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Mesh edges: {}", mesh.num_mesh_edges());
    println!("Face-edges: {}", mesh.num_face_edges());
    println!("Faces: {}", mesh.num_faces());
    println!("Surface area: {:.6}", mesh.surface_area());

    if let Some(bounds) = mesh.bounding_box() {
        let (min, max) = (bounds.min, bounds.max);
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let size = bounds.size();
        println!("Dimensions: {:.3} x {:.3} x {:.3}", size.x, size.y, size.z);
    }

    let sides: Vec<usize> = mesh.face_ids().map(|f| mesh.face_vertex_count(f)).collect();
    if sides.iter().all(|&n| n == 3) {
        println!("Mesh type: Triangle mesh");
    } else if sides.iter().all(|&n| n == 4) {
        println!("Mesh type: Quad mesh");
    } else {
        println!("Mesh type: Mixed polygon mesh");
    }

    let non_manifold = mesh.non_manifold_edges();
    if non_manifold.is_empty() {
        println!("Topology: Closed manifold");
    } else {
        let open = non_manifold
            .iter()
            .filter(|&&e| mesh.edge_face_count(e) < 2)
            .count();
        println!(
            "Topology: {} non-manifold edges ({} open, {} shared by 3+ faces)",
            non_manifold.len(),
            open,
            non_manifold.len() - open
        );
    }

    Ok(())
}

fn cmd_clean(input: &Path, output: &Path, epsilon: f64) -> Result<(), Box<dyn std::error::Error>> {
    let mut mesh: Mesh = io::load_unmerged(input)?;
    println!(
        "Loaded: {} vertices, {} mesh edges, {} faces",
        mesh.num_vertices(),
        mesh.num_mesh_edges(),
        mesh.num_faces()
    );

    let start = Instant::now();
    let options = CleanOptions::default().with_epsilon(epsilon);
    let report = clean_and_merge(&mut mesh, &options, &CancellationToken::new(), &create_progress())?;
    let elapsed = start.elapsed();

    println!(
        "Merged {} vertices and {} mesh edges, removed {} faces ({:.2?})",
        report.vertices_merged, report.edges_merged, report.faces_removed, elapsed
    );
    println!(
        "Result: {} vertices, {} mesh edges, {} faces, {} non-manifold edges",
        mesh.num_vertices(),
        mesh.num_mesh_edges(),
        mesh.num_faces(),
        mesh.non_manifold_edges().len()
    );

    io::save(&mesh, output)?;
    println!("Saved: {}", output.display());
    Ok(())
}

fn cmd_order(
    input: &Path,
    eye: &Point3<f64>,
    samples: usize,
    unbalanced: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh: Mesh = io::load(input)?;

    let start = Instant::now();
    let options = BspOptions::default()
        .with_max_faces_to_sample(samples)
        .with_balance_tree(!unbalanced);
    let tree = BspTree::build(&mesh, &options)?;
    println!(
        "BSP: {} nodes, depth {} ({:.2?})",
        tree.len(),
        tree.depth(),
        start.elapsed()
    );

    let order = tree.visibility_order_from_eye(eye);
    let line: Vec<String> = order.iter().map(|f| f.index().to_string()).collect();
    println!("Back to front: {}", line.join(" "));
    Ok(())
}
