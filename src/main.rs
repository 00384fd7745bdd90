use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use painel::config::Config;
use painel::domain::{
  calendar, AppointmentStatus, CalendarEvent, Employee, Lifecycle, OrderStatus, RequestStatus,
  StockItem, StockStatus,
};
use painel::http::{HttpTransport, LoginRedirect};
use painel::session::{FileStore, Session};
use painel::{logging, QueryCache, SyncClient};

#[derive(Parser, Debug)]
#[command(name = "painel")]
#[command(about = "Back-office console client for the painel backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/painel/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Store a session token (falls back to PAINEL_TOKEN)
  Login { token: Option<String> },
  /// Forget the session token
  Logout,
  /// List employees
  Employees {
    /// Only active employees
    #[arg(long)]
    active: bool,
  },
  /// Show one employee
  Employee { id: u64 },
  /// Look an employee up by CPF
  EmployeeByCpf { cpf: String },
  /// Free slots of an employee on a day (YYYY-MM-DD)
  Availability { id: u64, date: NaiveDate },
  /// Dashboard counters and critical stock
  Dashboard,
  /// Appointment calendar, optionally for one day (YYYY-MM-DD)
  Calendar {
    #[arg(long)]
    date: Option<NaiveDate>,
  },
  /// Appointments from now on
  Upcoming,
  /// List stock items
  Stock {
    /// Only items below their minimum quantity
    #[arg(long)]
    critical: bool,
  },
  /// Move an order to a new status
  OrderStatus { id: u64, status: String },
  /// Move an appointment to a new status
  AppointmentStatus { id: u64, status: String },
  /// Accept or reject an approval request
  RequestStatus { id: u64, status: String },
  /// Move a stock item to a new status
  StockStatus { id: u64, status: String },
}

/// Tells the terminal user to sign in again.
struct CliRedirect {
  login_url: String,
}

impl LoginRedirect for CliRedirect {
  fn redirect_to_login(&self) {
    eprintln!(
      "Session expired. Run `painel login` (web login: {}).",
      self.login_url
    );
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(&logging::default_log_dir()?)?;

  let config = Config::load(args.config.as_deref())?;
  tracing::info!(base_url = %config.api.base_url, "configuration loaded");

  let transport = HttpTransport::new(&config.api.base_url, config.api.timeout())?;
  let session = Session::new(FileStore::open_default()?);
  let cache = QueryCache::new(config.cache_config());
  let _gc = cache.spawn_gc();

  let redirect = CliRedirect {
    login_url: format!(
      "{}{}",
      config.api.base_url.trim_end_matches('/'),
      config.api.login_path
    ),
  };
  let client = SyncClient::new(Arc::new(transport), session, cache, Arc::new(redirect));

  run(&client, args.command).await
}

async fn run(client: &SyncClient, command: Command) -> Result<()> {
  match command {
    Command::Login { token } => {
      let token = match token {
        Some(token) => token,
        None => Config::get_token()?,
      };
      client.login(&token)?;
      println!("Logged in.");
    }
    Command::Logout => {
      client.logout();
      println!("Logged out.");
    }
    Command::Employees { active } => {
      for employee in client.employees(active).await? {
        print_employee(&employee);
      }
    }
    Command::Employee { id } => print_employee(&client.employee(id).await?),
    Command::EmployeeByCpf { cpf } => print_employee(&client.employee_by_cpf(&cpf).await?),
    Command::Availability { id, date } => {
      let availability = client.availability(id, date).await?;
      if availability.slots.is_empty() {
        println!("No free slots on {}.", availability.date);
      }
      for slot in availability.slots {
        println!("{}  {}", availability.date, slot);
      }
    }
    Command::Dashboard => {
      let counters = client.dashboard().await?;
      println!("Critical stock items:  {}", counters.critical_stock);
      println!("Appointments today:    {}", counters.today_appointments);
      println!("Occupancy rate:        {:.0}%", counters.occupancy_rate * 100.0);
      println!("Future appointments:   {}", counters.future_appointments);

      let critical = client.critical_stock().await?;
      if !critical.is_empty() {
        println!();
        for item in critical {
          print_stock_item(&item);
        }
      }
    }
    Command::Calendar { date } => {
      for event in client.calendar(date).await? {
        print_event(&event);
      }
    }
    Command::Upcoming => {
      let events = calendar::project(&client.upcoming_appointments().await?, None);
      for event in events {
        print_event(&event);
      }
    }
    Command::Stock { critical } => {
      for item in client.stock(critical).await? {
        print_stock_item(&item);
      }
    }
    Command::OrderStatus { id, status } => {
      let order = client.set_order_status(id, parse_status::<OrderStatus>(&status)?).await?;
      println!("Order {} is now {}", order.id, order.status.as_str());
    }
    Command::AppointmentStatus { id, status } => {
      let appointment = client
        .set_appointment_status(id, parse_status::<AppointmentStatus>(&status)?)
        .await?;
      println!(
        "Appointment {} is now {}",
        appointment.id,
        appointment.status.as_str()
      );
    }
    Command::RequestStatus { id, status } => {
      let request = client
        .set_request_status(id, parse_status::<RequestStatus>(&status)?)
        .await?;
      println!("Request {} is now {}", request.id, request.status.as_str());
    }
    Command::StockStatus { id, status } => {
      let item = client
        .set_stock_status(id, parse_status::<StockStatus>(&status)?)
        .await?;
      println!("{} is now {}", item.name, item.status.as_str());
    }
  }

  Ok(())
}

fn parse_status<S: Lifecycle>(input: &str) -> Result<S> {
  let normalized = input.trim().to_uppercase().replace('-', "_");
  S::parse(&normalized).ok_or_else(|| {
    let known: Vec<&str> = S::ALL.iter().map(|s| s.as_str()).collect();
    eyre!(
      "Unknown {} status '{}'. Expected one of: {}",
      S::KIND,
      input,
      known.join(", ")
    )
  })
}

fn print_employee(employee: &Employee) {
  println!(
    "{:>6}  {:<30} {:<12} {:<15} {}",
    employee.id,
    employee.name,
    employee.cpf,
    employee.role.as_deref().unwrap_or("-"),
    if employee.active { "active" } else { "inactive" }
  );
}

fn print_stock_item(item: &StockItem) {
  println!(
    "{:>6}  {:<30} {}/{}  {}",
    item.id,
    item.name,
    item.quantity,
    item.min_quantity,
    item.status.as_str()
  );
}

fn print_event(event: &CalendarEvent) {
  println!(
    "{}  {}  {:<40} {}",
    event.start.format("%Y-%m-%d %H:%M"),
    event.color,
    event.title,
    event.status.as_str()
  );
}
