use clap::Parser;
use qu::ick_use::*;
use vaers_onset_analysis::cache::ResultCache;

/// Remove cached aggregation results so the next run recomputes them.
///
/// The cache is keyed by aggregation mode only, not by input files; run this after
/// downloading new VAERS data drops.
#[derive(Parser)]
struct Opt {
    /// Only clear this cache key
    #[clap(long)]
    key: Option<String>,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let cache = ResultCache::new(".");
    let keys: Vec<&str> = match &opt.key {
        Some(key) => {
            ensure!(
                ResultCache::KEYS.contains(&key.as_str()),
                "unknown cache key \"{}\"; valid keys are: {}",
                key,
                ResultCache::KEYS.join(", ")
            );
            vec![key.as_str()]
        }
        None => ResultCache::KEYS.to_vec(),
    };
    for key in keys {
        if cache.clear(key)? {
            println!("removed {}", cache.entry_path(key).display());
        } else {
            println!("no cache at {}", cache.entry_path(key).display());
        }
    }
    Ok(())
}
