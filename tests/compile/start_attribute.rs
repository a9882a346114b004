use aryn::{routine, Step, Wake};

#[aryn::start]
fn main() {
    let driver = aryn::run(
        |n: u32| routine::from_fn(move |_: Wake<()>| Ok(Step::Complete(n + 1))),
        1,
    );
    driver.on_done(|n| assert_eq!(n, 2));
}
