use infracheck::checks::VeeamRepository;
use infracheck::cli::run_check;

fn main() {
    run_check::<VeeamRepository>()
}
