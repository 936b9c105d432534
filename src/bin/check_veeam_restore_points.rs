use infracheck::checks::VeeamRestorePoints;
use infracheck::cli::run_check;

fn main() {
    run_check::<VeeamRestorePoints>()
}
