use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{bail, Context, Result};
use clap::{App, Arg, ArgMatches};
use log::{debug, info, warn};
use sweep_algorithms::{
    alignment::{AlignmentStep, LoggingObserver, PushOutcome, SequentialAligner},
    bounds::calculate_bounds,
    config::AlignmentConfig,
};
use sweep_io::ascii::{AsciiReader, AsciiWriter};

struct Args {
    pub inputs: Vec<PathBuf>,
    pub format: String,
    pub delimiter: String,
    pub extension: String,
    pub output_dir: Option<PathBuf>,
    pub config: AlignmentConfig,
}

fn get_args() -> Result<Args> {
    let matches = App::new("sweep align")
        .version("0.1")
        .about("Aligns a sequence of point cloud scans pairwise with nonlinear ICP and prints each pairwise transform")
        .arg(
            Arg::with_name("INPUT")
                .takes_value(true)
                .multiple(true)
                .value_name("INPUT")
                .help("Point files or directories of point files. Scans are processed in order of their file names")
                .required(true),
        )
        .arg(
            Arg::with_name("FORMAT")
                .short("f")
                .long("format")
                .takes_value(true)
                .default_value("xyzir")
                .help("Column format of the point files (s x y z i r)"),
        )
        .arg(
            Arg::with_name("DELIMITER")
                .short("d")
                .long("delimiter")
                .takes_value(true)
                .default_value(" ")
                .help("Column delimiter. Whitespace splits on any run of whitespace"),
        )
        .arg(
            Arg::with_name("EXTENSION")
                .long("extension")
                .takes_value(true)
                .default_value("txt")
                .help("Extension of the point files to pick from input directories"),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("DIR")
                .help("Writes every aligned scan, mapped into the frame of the first scan, to this directory"),
        )
        .arg(
            Arg::with_name("CONFIG")
                .short("c")
                .long("config")
                .takes_value(true)
                .value_name("FILE")
                .help("JSON alignment configuration. Command line options override its values"),
        )
        .arg(
            Arg::with_name("LEAF_SIZE")
                .long("leaf-size")
                .takes_value(true)
                .help("Voxel edge for downsampling, 0 disables downsampling"),
        )
        .arg(
            Arg::with_name("K_NEIGHBORS")
                .long("k-neighbors")
                .takes_value(true)
                .help("Neighbourhood size for normal estimation"),
        )
        .arg(
            Arg::with_name("MAX_ITERATIONS")
                .long("max-iterations")
                .takes_value(true)
                .help("Maximum number of ICP iterations"),
        )
        .arg(
            Arg::with_name("EPSILON")
                .long("epsilon")
                .takes_value(true)
                .help("Convergence threshold on the incremental transform"),
        )
        .arg(
            Arg::with_name("MAX_DISTANCE")
                .long("max-correspondence-distance")
                .takes_value(true)
                .help("Correspondences farther apart than this are discarded"),
        )
        .arg(
            Arg::with_name("NO_FILTER")
                .long("no-range-filter")
                .help("Keep all points instead of the configured height band"),
        )
        .arg(
            Arg::with_name("ONCE")
                .long("once")
                .help("Stop after the first registration"),
        )
        .get_matches();

    let mut config = match matches.value_of("CONFIG") {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Could not open config file {}", path))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Could not parse config file {}", path))?
        }
        None => AlignmentConfig::default(),
    };
    apply_overrides(&mut config, &matches)?;

    Ok(Args {
        inputs: matches
            .values_of("INPUT")
            .map(|values| values.map(PathBuf::from).collect())
            .unwrap_or_default(),
        format: matches.value_of("FORMAT").unwrap_or("xyzir").to_string(),
        delimiter: matches.value_of("DELIMITER").unwrap_or(" ").to_string(),
        extension: matches.value_of("EXTENSION").unwrap_or("txt").to_string(),
        output_dir: matches.value_of("OUTPUT").map(PathBuf::from),
        config,
    })
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        Some(value) => match value.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => bail!("Invalid value '{}' for {}", value, name),
        },
        None => Ok(None),
    }
}

fn apply_overrides(config: &mut AlignmentConfig, matches: &ArgMatches) -> Result<()> {
    if let Some(leaf_size) = parse_arg::<f64>(matches, "LEAF_SIZE")? {
        config.leaf_size = if leaf_size == 0.0 { None } else { Some(leaf_size) };
    }
    if let Some(k_neighbors) = parse_arg(matches, "K_NEIGHBORS")? {
        config.k_neighbors = k_neighbors;
    }
    if let Some(max_iterations) = parse_arg(matches, "MAX_ITERATIONS")? {
        config.registration.max_iterations = max_iterations;
    }
    if let Some(epsilon) = parse_arg(matches, "EPSILON")? {
        config.registration.transformation_epsilon = epsilon;
    }
    if let Some(distance) = parse_arg(matches, "MAX_DISTANCE")? {
        config.registration.max_correspondence_distance = distance;
    }
    if matches.is_present("NO_FILTER") {
        config.range_filter = None;
    }
    if matches.is_present("ONCE") {
        config.step_limit = Some(1);
    }
    Ok(())
}

/// All point files named by `inputs`, sorted by file name
fn collect_files(inputs: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for input in inputs {
        if input.is_dir() {
            for entry in std::fs::read_dir(input)
                .with_context(|| format!("Could not read directory {}", input.display()))?
            {
                let path = entry?.path();
                if path.is_file() && path.extension().map_or(false, |e| e == extension) {
                    files.push(path);
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn write_step(output_dir: &Path, step: &AlignmentStep) -> Result<()> {
    // current_in_previous is in the previous frame, the global transform before this step maps that frame
    // into the first one
    let into_first = step.global * step.pairwise.inverse();
    let path = output_dir.join(format!("{}_aligned.txt", step.header.frame_id));
    AsciiWriter::from_path(&path)?.write(&step.current_in_previous.transformed(&into_first))?;
    info!("Wrote {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = get_args()?;

    let files = collect_files(&args.inputs, &args.extension)?;
    if files.is_empty() {
        bail!("No point files found");
    }
    if let Some(output_dir) = &args.output_dir {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Could not create output directory {}", output_dir.display()))?;
    }

    let mut aligner = SequentialAligner::new(args.config)?.with_observer(LoggingObserver);
    let t_start = Instant::now();
    let mut failures = 0;

    for file in &files {
        let cloud = AsciiReader::from_path(file, &args.format, &args.delimiter)?.read()?;
        if let Some(bounds) = calculate_bounds(&cloud) {
            debug!(
                "{}: {} points around {} with extent {}",
                file.display(),
                cloud.len(),
                bounds.center(),
                bounds.extent()
            );
        }
        match aligner.push(&cloud) {
            Ok(PushOutcome::Initialized) => {}
            Ok(PushOutcome::Aligned(step)) => {
                println!("{}", step.pairwise);
                if let Some(output_dir) = &args.output_dir {
                    write_step(output_dir, &step)?;
                }
            }
            Ok(PushOutcome::Ignored) => break,
            Err(_) => failures += 1,
        }
    }

    if failures > 0 {
        warn!("{} of {} scans could not be aligned", failures, files.len());
    }
    info!(
        "Aligned {} scans in {:.2}s",
        aligner.steps(),
        t_start.elapsed().as_secs_f64()
    );
    println!("Global transform:\n{}", aligner.global_transform());
    Ok(())
}
