mod test_idle_timeout;
mod test_ownership_gating;
