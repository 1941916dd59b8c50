use std::path::Path;
use crate::cli::commands::{SortArgs, SortKind};
use crate::config::defaults;
use crate::errors::ProbeError;
use crate::store::{canonicalize_file, sort_hit_log_file, BlockStyle};

pub async fn handle_sort(args: SortArgs) -> Result<(), ProbeError> {
    let kind = args.kind.unwrap_or_else(|| guess_kind(&args.file));
    let existed = match kind {
        SortKind::Findings => canonicalize_file(&args.file, BlockStyle::FINDINGS).await?,
        SortKind::Hits => canonicalize_file(&args.file, BlockStyle::CALLBACK_RESULTS).await?,
        SortKind::HitLog => sort_hit_log_file(&args.file).await?,
    };
    if !existed {
        return Err(ProbeError::Config(format!("No such file: {}", args.file.display())));
    }
    println!("Sorted {} by payload id", args.file.display());
    Ok(())
}

/// The listener's own file names map to their formats; anything else is
/// treated as a scanner findings file.
pub fn guess_kind(path: &Path) -> SortKind {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if name == defaults::HIT_LOG_NAME || name.ends_with(".log") {
        SortKind::HitLog
    } else if Path::new(defaults::RESULT_FILE).file_name().and_then(|n| n.to_str()) == Some(name) {
        SortKind::Hits
    } else {
        SortKind::Findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_kind() {
        assert_eq!(guess_kind(Path::new("result/xss_hits.log")), SortKind::HitLog);
        assert_eq!(guess_kind(Path::new("result/working.txt")), SortKind::Hits);
        assert_eq!(guess_kind(Path::new("result/findings.txt")), SortKind::Findings);
    }
}
