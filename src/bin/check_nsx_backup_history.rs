use infracheck::checks::NsxBackupHistory;
use infracheck::cli::run_check;

fn main() {
    run_check::<NsxBackupHistory>()
}
