//! Deterministic bank-marketing style tables for unit tests.

use std::fmt::Write;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::dataloader::RawTable;

pub const BANK_HEADER: &str = "age,job,marital,education,default,housing,loan,contact,month,day_of_week,duration,campaign,pdays,previous,poutcome,emp.var.rate,cons.price.idx,cons.conf.idx,euribor3m,nr.employed,y";

const JOBS: [&str; 5] = ["admin.", "blue-collar", "technician", "services", "management"];
const MARITAL: [&str; 3] = ["married", "single", "divorced"];
const EDUCATION: [&str; 3] = ["basic.4y", "high.school", "university.degree"];
const CONTACT: [&str; 2] = ["cellular", "telephone"];
const MONTHS: [&str; 6] = ["mar", "may", "jun", "jul", "aug", "nov"];
const DAYS: [&str; 5] = ["mon", "tue", "wed", "thu", "fri"];
const POUTCOME: [&str; 3] = ["nonexistent", "failure", "success"];

/// CSV text with `rows` complete records cycling through the first `jobs` job titles.
pub fn bank_csv(rows: usize, jobs: usize) -> String {
    let jobs = jobs.clamp(1, JOBS.len());
    let mut rng = SmallRng::seed_from_u64(7);
    let mut out = String::from(BANK_HEADER);
    out.push('\n');
    for row in 0..rows {
        let duration: u32 = rng.gen_range(0..1000);
        let poutcome = POUTCOME[row % POUTCOME.len()];
        let noise: f64 = rng.gen_range(-2.0..2.0);
        let score = (f64::from(duration) - 500.0) / 100.0
            + if poutcome == "success" { 2.0 } else { 0.0 }
            + noise;
        let _ = writeln!(
            out,
            "{age},{job},{marital},{education},no,{housing},no,{contact},{month},{day},{duration},{campaign},999,0,{poutcome},1.1,93.994,-36.4,4.857,5191,{y}",
            age = 25 + rng.gen_range(0..40),
            job = JOBS[row % jobs],
            marital = MARITAL[row % MARITAL.len()],
            education = EDUCATION[row % EDUCATION.len()],
            housing = if row % 2 == 0 { "yes" } else { "no" },
            contact = CONTACT[row % CONTACT.len()],
            month = MONTHS[row % MONTHS.len()],
            day = DAYS[row % DAYS.len()],
            campaign = 1 + row % 4,
            y = if score > 0.0 { "yes" } else { "no" },
        );
    }
    out
}

/// Parsed form of [`bank_csv`].
pub fn bank_table(rows: usize, jobs: usize) -> RawTable {
    RawTable::from_csv_str(&bank_csv(rows, jobs)).expect("fixture csv parses")
}
