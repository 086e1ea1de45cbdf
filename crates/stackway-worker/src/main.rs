use stackway_worker::{Worker, init_tracing};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = match stackway_config::loader::load_settings(None) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("settings error: {err}");
            std::process::exit(1);
        }
    };
    init_tracing(&settings.logging.level);

    let worker = match Worker::from_settings(settings) {
        Ok(worker) => worker,
        Err(err) => {
            eprintln!("wiring error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = worker.run().await {
        eprintln!("worker error: {err}");
    }
}
