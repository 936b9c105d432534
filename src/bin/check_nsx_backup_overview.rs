use infracheck::checks::NsxBackupOverview;
use infracheck::cli::run_check;

fn main() {
    run_check::<NsxBackupOverview>()
}
