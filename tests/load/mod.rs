mod harness_test;
mod support;
