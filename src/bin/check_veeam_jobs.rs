use infracheck::checks::VeeamJobs;
use infracheck::cli::run_check;

fn main() {
    run_check::<VeeamJobs>()
}
