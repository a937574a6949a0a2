//! Batch robustness experiment: load a trained network and a labeled image
//! set, tighten the ReLU bounds, then search for a minimal adversarial
//! example per image against a shifted target class.

use log::{info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use relumilp::{io, AdversarialQuery, TightenMode};
use std::time::{Duration, Instant};

const USAGE: &str = "usage: robustness <weights.csv> <images.csv> <classes.csv> \
     [--certified] [--max-deviation F] [--gap F] [--out DIR]";

struct Args {
    weights: String,
    images: String,
    classes: String,
    certified: bool,
    max_deviation: f64,
    gap: Option<f64>,
    out_dir: Option<String>,
}

fn parse_args() -> Option<Args> {
    let mut positional = Vec::new();
    let mut args = Args {
        weights: String::new(),
        images: String::new(),
        classes: String::new(),
        certified: false,
        max_deviation: 1.,
        gap: None,
        out_dir: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--certified" => args.certified = true,
            "--max-deviation" => args.max_deviation = it.next()?.parse().ok()?,
            "--gap" => args.gap = Some(it.next()?.parse().ok()?),
            "--out" => args.out_dir = Some(it.next()?),
            _ => positional.push(arg),
        }
    }
    if positional.len() != 3 {
        return None;
    }
    args.classes = positional.pop().unwrap();
    args.images = positional.pop().unwrap();
    args.weights = positional.pop().unwrap();
    Some(args)
}

fn init_logging() {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} {m}{n}")))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .unwrap();
    let _log_res = log4rs::init_config(config);
}

fn main() -> relumilp::Result<()> {
    init_logging();
    let args = match parse_args() {
        Some(args) => args,
        None => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    let mut network = io::read_weights(&args.weights)?;
    let images = io::read_images(&args.images)?;
    let classes = io::read_classifications(&args.classes)?;
    assert_eq!(images.len(), classes.len());
    info!("loaded network {}", network);

    let mode = if args.certified {
        TightenMode::Certified
    } else {
        TightenMode::TimeBudgeted(Duration::from_secs(1))
    };
    let start = Instant::now();
    for stats in relumilp::tighten_bounds(&mut network, mode) {
        info!("{}", stats);
    }
    info!("bound tightening took {:?}", start.elapsed());

    let width = (network.input_dim() as f64).sqrt() as usize;
    let mut solved = 0usize;
    let mut total_time = Duration::ZERO;
    let mut total_disturbance = 0.;
    for (h, (image, &label)) in images.iter().zip(classes.iter()).enumerate() {
        let predicted = network.classify(image.view());
        if predicted != label {
            info!("image {}: already misclassified as {}, skipping", h, predicted);
            continue;
        }
        let target = (label + 5) % network.output_dim();
        let mut query =
            AdversarialQuery::new(&network, image.clone(), target, args.max_deviation);
        if let Some(gap) = args.gap {
            query = query.with_gap_tolerance(gap);
        }
        let start = Instant::now();
        let result = query.solve();
        let elapsed = start.elapsed();
        total_time += elapsed;
        info!(
            "image {}: {} -> {} status {:?} disturbance {:?} gap {:?} nodes {} in {:?}",
            h,
            label,
            target,
            result.status(),
            result.total_disturbance(),
            result.relative_gap(),
            result.nodes(),
            elapsed
        );
        if result.solved() {
            solved += 1;
            if let Some(d) = result.total_disturbance() {
                total_disturbance += d;
            }
        }
        if let (Some(dir), Some(adversarial)) = (&args.out_dir, result.recovered_input()) {
            if width * width == network.input_dim() {
                let path = format!("{}/adversarial_{}.csv", dir, h);
                io::write_image(path, &adversarial, width)?;
            }
        }
    }
    info!(
        "solved {}/{} queries, mean disturbance {:.4}, total solve time {:?}",
        solved,
        images.len(),
        if solved > 0 { total_disturbance / solved as f64 } else { 0. },
        total_time
    );
    Ok(())
}
