#[path = "../test_utils.rs"]
mod test_utils;

mod applications_test;
mod middleware_test;
mod slots_test;
