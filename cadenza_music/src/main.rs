// Cadenza Music Engine: CLI entry point.
//
// Builds a generation request from a preset, a JSON config file and/or
// flags, generates the document and writes it to MIDI.
// The pipeline: request resolution → generation → MIDI output → read-back check.
//
// Usage:
//   cargo run -p cadenza_music -- [output.mid] [--preset NAME] [--config FILE]
//     [--scale NAME] [--tempo CLASS] [--low N] [--high N] [--program N]
//     [--role ROLE] [--notes N] [--seed N] [--temperature T]
//     [--orchestra] [--drums] [--parallel]
//     [--no-scale] [--no-smooth] [--no-quantize] [--json FILE] [--list]
//
// Set RUST_LOG (e.g. RUST_LOG=cadenza_music=debug) for engine logging.

use cadenza_music::cancel::{CancelToken, Progress, ProgressStage};
use cadenza_music::catalog;
use cadenza_music::constraint::Role;
use cadenza_music::error::{MusicError, Result};
use cadenza_music::midi::{read_midi, write_midi};
use cadenza_music::request::{GenerationRequest, ScaleChoice, TempoChoice};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cadenza_music=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--list") {
        print_catalog();
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<()> {
    let output_path = args
        .get(1)
        .filter(|s| !s.starts_with("--"))
        .map(|s| s.as_str())
        .unwrap_or("output.mid");

    println!("=== Cadenza Music Engine ===");
    println!("Output: {}", output_path);

    println!("[1/4] Resolving request...");
    let request = build_request(args)?;
    let (constraint, roster) = request.resolve()?;
    println!(
        "  Scale: {:?}  Tempo: {:?}",
        request.scale, request.tempo
    );
    println!(
        "  Pitch range: {}-{}  Temperature: {}",
        constraint.pitch_range().low(),
        constraint.pitch_range().high(),
        request.temperature
    );
    let rules = constraint.rules();
    println!(
        "  Rules: scale={} smooth={} quantize={}",
        rules.use_scale, rules.smooth_melody, rules.quantize_rhythm
    );
    if roster.is_empty() {
        println!(
            "  Single part: {} ({}), {} notes",
            request.single_part().display_name,
            request.role.name(),
            request.notes
        );
    } else {
        println!(
            "  Roster: {} parts x {} notes{}",
            roster.len(),
            request.notes_per_part,
            if request.parallel { " (parallel)" } else { "" }
        );
    }
    if let Some(s) = request.seed {
        println!("  Seed: {}", s);
    }
    println!();

    println!("[2/4] Generating...");
    let start = Instant::now();
    let progress = |p: Progress| {
        if p.stage == ProgressStage::Finished {
            println!(
                "  [{:>3}%] {} ({}/{})",
                p.percent(),
                p.part_name,
                p.part_index + 1,
                p.part_count
            );
        }
    };
    let doc = request.run(CancelToken::new(), &progress)?;
    let summary = doc.summary();
    println!(
        "  {} tracks, {} notes, {:.1}s of music in {:.2?}",
        summary.tracks,
        summary.notes,
        summary.duration_seconds,
        start.elapsed()
    );

    println!("[3/4] Writing MIDI...");
    let path = Path::new(output_path);
    write_midi(&doc, path)?;
    if let Some(json_path) = parse_flag::<String>(args, "--json") {
        let file = std::fs::File::create(&json_path)?;
        doc.write_json(std::io::BufWriter::new(file))?;
        println!("  Document dumped to {}", json_path);
    }

    println!("[4/4] Verifying output...");
    let back = read_midi(path)?.summary();
    if back.tracks != summary.tracks || back.notes != summary.notes {
        return Err(MusicError::Midi(format!(
            "read back {} tracks / {} notes, wrote {} / {}",
            back.tracks, back.notes, summary.tracks, summary.notes
        )));
    }

    println!();
    println!(
        "Done! {} notes | {:.1} s -> {}",
        summary.notes, summary.duration_seconds, output_path
    );
    Ok(())
}

/// Build the request from a config file or preset, then apply flags.
/// A config file may name its own preset, so `--config` takes precedence.
fn build_request(args: &[String]) -> Result<GenerationRequest> {
    let mut request = if let Some(path) = parse_flag::<String>(args, "--config") {
        GenerationRequest::load(Path::new(&path))?
    } else if let Some(name) = parse_flag::<String>(args, "--preset") {
        GenerationRequest::from_preset(&name)?
    } else {
        GenerationRequest::default()
    };

    if let Some(name) = parse_flag::<String>(args, "--scale") {
        request.scale = ScaleChoice::Named(name);
    }
    if let Some(name) = parse_flag::<String>(args, "--tempo") {
        request.tempo = TempoChoice::Named(name);
    }
    if let Some(low) = parse_flag(args, "--low") {
        request.pitch_low = low;
    }
    if let Some(high) = parse_flag(args, "--high") {
        request.pitch_high = high;
    }
    if let Some(program) = parse_flag(args, "--program") {
        request.program = program;
    }
    if let Some(name) = parse_flag::<String>(args, "--role") {
        request.role = Role::parse(&name)
            .ok_or_else(|| MusicError::Config(format!("unknown role '{name}'")))?;
    }
    if let Some(notes) = parse_flag(args, "--notes") {
        request.notes = notes;
        request.notes_per_part = notes;
    }
    if let Some(seed) = parse_flag(args, "--seed") {
        request.seed = Some(seed);
    }
    if let Some(t) = parse_flag(args, "--temperature") {
        request.temperature = t;
    }
    if has_flag(args, "--orchestra") && request.roster.is_empty() {
        request.roster = catalog::default_orchestra();
    }
    request.drums |= has_flag(args, "--drums");
    request.parallel |= has_flag(args, "--parallel");
    if has_flag(args, "--no-scale") {
        request.rules.use_scale = false;
    }
    if has_flag(args, "--no-smooth") {
        request.rules.smooth_melody = false;
    }
    if has_flag(args, "--no-quantize") {
        request.rules.quantize_rhythm = false;
    }
    Ok(request)
}

fn print_catalog() {
    println!("Presets:");
    for p in catalog::presets() {
        println!(
            "  {:<22} {} / {} / {}{}",
            p.name,
            catalog::program_label(p.program),
            p.scale,
            p.tempo,
            if p.orchestra { " (orchestra)" } else { "" }
        );
    }
    println!("Scales: {}", catalog::scale_names().collect::<Vec<_>>().join(", "));
    println!("Tempo classes: {}", catalog::tempo_names().collect::<Vec<_>>().join(", "));
    println!(
        "Roles: {}",
        Role::ALL.iter().map(|r| r.name()).collect::<Vec<_>>().join(", ")
    );
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
