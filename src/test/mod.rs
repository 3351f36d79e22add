mod lossy_link;
mod rlc_scenarios;
mod sequence_number;
mod timer_table;
