mod helpers;
mod tests_flush;
mod tests_recovery;
