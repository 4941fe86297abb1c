//! gitlab-batch command-line entry point.

fn main() {
    let registry = gitlab_batch::cli::registry();
    let matches = registry.build_surface().get_matches();
    if let Err(e) = gitlab_batch::cli::dispatch(&registry, &matches) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
