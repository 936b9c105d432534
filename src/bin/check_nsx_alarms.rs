use infracheck::checks::NsxAlarms;
use infracheck::cli::run_check;

fn main() {
    run_check::<NsxAlarms>()
}
