mod demo;

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use comping_core::config::Config;
use comping_core::context::SongContext;
use comping_core::generator::PatternGenerator;
use comping_core::model::{MidiMixHandle, PlaybackSettings};
use comping_core::session::{EndAction, SessionEnv, SessionFlags, SessionRegistry};
use comping_core::transport::{LogSink, PlaybackEvent, PlaybackEvents, TransportHandle};

struct Args {
    verbose: bool,
    stderr: bool,
    json: bool,
    tempo: Option<u16>,
    loops: Option<i32>,
    from_bar: i32,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };
        Self {
            verbose: args.iter().any(|a| a == "--verbose" || a == "-v"),
            stderr: args.iter().any(|a| a == "--stderr"),
            json: args.iter().any(|a| a == "--json"),
            tempo: value("--tempo").and_then(|s| s.parse().ok()),
            loops: value("--loops").and_then(|s| s.parse().ok()),
            from_bar: value("--from").and_then(|s| s.parse().ok()).unwrap_or(0),
        }
    }
}

fn init_logging(verbose: bool, to_stderr: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    if to_stderr {
        let _ = TermLogger::init(
            log_level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        );
        return;
    }

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("comping")
        .join("comping.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/comping.log")) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cannot create log file: {}", e);
            return;
        }
    };

    if WriteLogger::init(log_level, Config::default(), log_file).is_err() {
        eprintln!("logger already initialized");
    }

    log::info!("comping starting (log level: {:?})", log_level);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose, args.stderr);

    let config = Config::load();
    let settings = PlaybackSettings::from_config(&config);
    let registry = SessionRegistry::new(SessionEnv::from_config(
        Arc::new(PatternGenerator::new()),
        settings.clone(),
        &config,
    ));

    let song = demo::song(args.tempo.unwrap_or_else(|| settings.tempo()));
    let mix = MidiMixHandle::for_song(&song.snapshot());
    let context = SongContext::new(&song, &mix, None)?;

    let finished = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&finished);
    let end_action = EndAction::new(move || f.store(true, Ordering::SeqCst));

    let session = registry.get_or_create_session(
        &context,
        SessionFlags::from_settings(&settings),
        args.loops.unwrap_or_else(|| settings.loop_count()),
        Some(end_action),
    );
    session.generate(false)?;

    if args.json {
        if let Some(music) = session.music() {
            println!("{}", serde_json::to_string_pretty(&*music)?);
        }
        return Ok(());
    }

    let events = PlaybackEvents::new();
    let _printer = events.subscribe(|event| match event {
        PlaybackEvent::ChordChanged { chord, position } => println!("{:>8}  {}", position.to_string(), chord),
        PlaybackEvent::SongPartChanged { bar, name } => println!("-- {} (bar {})", name, bar + 1),
        PlaybackEvent::SessionUpdated { session, count } => println!("-- {} updated ({})", session, count),
        PlaybackEvent::EndOfPlayback => println!("-- end"),
        _ => {}
    });

    let mut transport = TransportHandle::new(
        Box::new(LogSink),
        events.sender(),
        config.midi_activity_window_ticks(),
    );
    transport.start(session.clone(), args.from_bar)?;

    while !finished.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(20));
        events.dispatch_pending();
    }
    events.dispatch_pending();

    transport.shutdown();
    registry.close_all();
    Ok(())
}
