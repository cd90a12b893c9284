/// Two-letter codes and full names of the 50 recognized states.
/// DC and the territories are deliberately absent.
pub const STATES: [(&str, &str); 50] = [
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

// Job titles offered by default (used when the config file has no [[jobs]] table)
pub const DEFAULT_JOBS: [(&str, &str); 5] = [
    ("Web Developer", "web_developer_salary.csv"),
    ("Machine Learning Engineer", "machine_learning_engineer_salary.csv"),
    ("Data Engineer", "data_engineer_salary.csv"),
    ("Full-Stack Software Engineer", "full_stack_software_engineer_salary.csv"),
    ("Analytics Product Manager", "analytics_product_manager_salary.csv"),
];

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_CACHE_DIR: &str = "data/cache";
pub const DEFAULT_RENT_FILE: &str = "rent_data.csv";
pub const DEFAULT_CRIME_FILE: &str = "crime_data.csv";
pub const DEFAULT_TOP_N: usize = 5;

pub const DEFAULT_RENT_TTL_DAYS: i64 = 30;
pub const DEFAULT_CRIME_TTL_DAYS: i64 = 365;
pub const DEFAULT_SALARY_TTL_DAYS: i64 = 7;

// Source preparation
pub const ZORI_RAW_FILE: &str = "City_zori_uc_sfrcondomfr_sm_month.csv";
pub const ZORI_TRAILING_MONTHS: usize = 12;
pub const ZORI_YEARLY_FILE: &str = "zori_avg_by_year.csv";
pub const ZORI_YEARLY_YEARS: [i32; 2] = [2024, 2025];
pub const CRIME_RATES_DIR: &str = "crime_rates";
pub const CRIME_RANKING_FILE: &str = "ranking_2020_2024.csv";
pub const CRIME_PERIOD_START: i32 = 2020;
pub const CRIME_PERIOD_END: i32 = 2024;
pub const VIOLENT_WEIGHT: f64 = 0.70;
pub const PROPERTY_WEIGHT: f64 = 0.30;
pub const SALARY_AGGREGATE_FILE: &str = "software-devops-junior-avg-salary.csv";

/// Output column order for ranked cache files
pub const OUTPUT_HEADER: [&str; 7] = [
    "rank",
    "city",
    "state",
    "rent",
    "crime_score",
    "salary",
    "affordability_index",
];
